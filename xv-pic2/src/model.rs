//! The pixel model shared by the decoder, the statistics pass and the
//! encoder.
//!
//! Every pixel is one of three kinds:
//! - chained: an earlier change point predicted its color, nothing is coded;
//! - unchanged: a single decision says it has the color of the pixel above;
//! - a change point: its color is coded, either as an index into a cache of
//!   recent colors or as deltas from the average of its upper and left
//!   neighbors. A change point may then chain its color to one of five
//!   pixels in the next row.

use crate::ColorFormat;
use crate::arith::Coder;
use crate::error::{Pic2Error, Result, bail};
use crate::number::{code_nn, fold, unfold};
use smallvec::SmallVec;

/// Guard pixels on each side of a row.
const PAD: usize = 2;
/// Padded positions the row window starts out with.
const INITIAL_WINDOW: usize = 256;

const CACHE_SIZE: usize = 32;
const CACHE_BUCKETS: usize = 512;

const CHAIN_START: usize = 8;
const CHAIN_CHOICE: usize = 9;
const CHAIN_CONTINUE: usize = 13;
const CACHE_HIT: u8 = 15;
const CACHE_MISS: u8 = 16;
const CACHE_INDEX: usize = 17;
const GREEN: usize = 32;
const RED: usize = 48;
const BLUE: usize = 64;

/// The candidate offsets for a chain in the next row, by priority.
const CHAIN_OFFSETS: [isize; 5] = [0, -1, 1, -2, 2];

/// Statistics about how the pixels of a block were coded.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BlockStats {
    /// Colors coded as deltas from their prediction.
    pub explicit_colors: u64,
    /// Colors coded as an index into the color cache.
    pub cache_hits: u64,
    /// Pixels whose color was predicted by a chain.
    pub chained_pixels: u64,
    /// Pixels whose color was coded at all.
    pub change_points: u64,
    /// Chains extended to the next row.
    pub chain_links: u64,
}

/// Per-bucket caches of recently coded colors, most recent first.
struct ColorCache {
    entries: Box<[[u32; CACHE_SIZE]]>,
    /// The physical position of the logical front of each bucket.
    heads: Box<[u8]>,
    hit_contexts: Box<[u8]>,
}

impl ColorCache {
    fn new() -> Self {
        Self {
            entries: vec![[0; CACHE_SIZE]; CACHE_BUCKETS].into_boxed_slice(),
            heads: vec![0; CACHE_BUCKETS].into_boxed_slice(),
            hit_contexts: vec![CACHE_MISS; CACHE_BUCKETS].into_boxed_slice(),
        }
    }

    #[inline]
    fn slot(&self, bucket: usize, index: usize) -> usize {
        (usize::from(self.heads[bucket]) + index) % CACHE_SIZE
    }

    fn find(&self, bucket: usize, color: u32) -> Option<usize> {
        (0..CACHE_SIZE).find(|&i| self.entries[bucket][self.slot(bucket, i)] == color)
    }

    /// Move the entry at `index` to the front. The entry halfway to the front
    /// takes its place and the old front moves there.
    fn promote(&mut self, bucket: usize, index: usize) -> u32 {
        let (front, middle, hit) = (
            self.slot(bucket, 0),
            self.slot(bucket, index / 2),
            self.slot(bucket, index),
        );
        let entries = &mut self.entries[bucket];

        let color = entries[hit];
        entries[hit] = entries[middle];
        entries[middle] = entries[front];
        entries[front] = color;

        color
    }

    /// Insert `color` at the front, dropping the oldest entry.
    fn insert(&mut self, bucket: usize, color: u32) {
        let head = (usize::from(self.heads[bucket]) + CACHE_SIZE - 1) % CACHE_SIZE;
        self.heads[bucket] = head as u8;
        self.entries[bucket][head] = color;
    }
}

/// The pixels the encoder wants to code.
#[derive(Clone, Copy)]
pub(crate) struct Target<'a> {
    pub(crate) row: &'a [u32],
    pub(crate) next: Option<&'a [u32]>,
}

/// The adaptive state of a block.
pub(crate) struct Model {
    format: ColorFormat,
    width: usize,
    height: usize,
    y: usize,
    above: Vec<u32>,
    line: Vec<u32>,
    below: Vec<u32>,
    chained_now: Vec<bool>,
    chained_next: Vec<bool>,
    activity_now: Vec<u8>,
    activity_next: Vec<u8>,
    cache: ColorCache,
    stats: BlockStats,
}

impl Model {
    pub(crate) fn new(format: ColorFormat, width: usize, height: usize) -> Self {
        let padded = (width + 2 * PAD).min(INITIAL_WINDOW);

        Self {
            format,
            width,
            height,
            y: 0,
            above: vec![0; padded],
            line: vec![0; padded],
            below: vec![0; padded],
            chained_now: vec![false; padded],
            chained_next: vec![false; padded],
            activity_now: vec![0; padded],
            activity_next: vec![0; padded],
            cache: ColorCache::new(),
            stats: BlockStats::default(),
        }
    }

    pub(crate) fn stats(&self) -> BlockStats {
        self.stats
    }

    pub(crate) fn rows_coded(&self) -> usize {
        self.y
    }

    /// The row coded last.
    pub(crate) fn last_row(&self) -> &[u32] {
        &self.above[PAD..PAD + self.width]
    }

    /// Code the next row.
    ///
    /// Encoders pass the row to code together with the row after it.
    pub(crate) fn code_row<C: Coder>(
        &mut self,
        coder: &mut C,
        target: Option<Target<'_>>,
    ) -> Result<()> {
        for x in 0..self.width {
            let i = x + PAD;
            self.grow_window(i + PAD + 1);
            let wanted = target.map(|t| t.row[x]);

            if self.chained_now[i] {
                self.stats.chained_pixels += 1;
                let color = self.line[i];
                self.code_chain(coder, x, color, CHAIN_CONTINUE, target)?;
                continue;
            }

            let activity = usize::from(self.activity_now[i].min(7));
            let changed = coder.code(activity, wanted.is_some_and(|c| c != self.above[i]))?;

            if changed {
                self.stats.change_points += 1;
                let color = self.code_color(coder, i, wanted)?;
                self.line[i] = color;

                bump(&mut self.activity_now[i + 1], 1);
                bump(&mut self.activity_next[i - 1], 1);
                bump(&mut self.activity_next[i], 2);
                bump(&mut self.activity_next[i + 1], 1);

                self.code_chain(coder, x, color, CHAIN_START, target)?;
            } else {
                self.line[i] = self.above[i];
            }
        }

        self.advance();

        Ok(())
    }

    /// Extend the row window to at least `needed` padded positions.
    ///
    /// The window only reaches its full width while the first row is coded,
    /// so a block with a huge width and little data fails before the
    /// memory for the whole row is allocated.
    fn grow_window(&mut self, needed: usize) {
        if needed <= self.line.len() {
            return;
        }

        let len = needed
            .max(2 * self.line.len())
            .min(self.width + 2 * PAD);

        self.above.resize(len, 0);
        self.line.resize(len, 0);
        self.below.resize(len, 0);
        self.chained_now.resize(len, false);
        self.chained_next.resize(len, false);
        self.activity_now.resize(len, 0);
        self.activity_next.resize(len, 0);
    }

    fn advance(&mut self) {
        std::mem::swap(&mut self.above, &mut self.line);
        std::mem::swap(&mut self.line, &mut self.below);
        self.below.fill(0);

        std::mem::swap(&mut self.chained_now, &mut self.chained_next);
        self.chained_next.fill(false);

        std::mem::swap(&mut self.activity_now, &mut self.activity_next);
        self.activity_next.fill(0);

        self.y += 1;
    }

    /// Code whether the color at `x` continues in the next row and where.
    fn code_chain<C: Coder>(
        &mut self,
        coder: &mut C,
        x: usize,
        color: u32,
        context: usize,
        target: Option<Target<'_>>,
    ) -> Result<()> {
        if self.y + 1 >= self.height {
            return Ok(());
        }

        let i = x + PAD;
        let suppress_far_right = self.chained_now[i + 1] || self.chained_now[i + 2];

        let candidates: SmallVec<[usize; 5]> = CHAIN_OFFSETS
            .iter()
            .filter(|&&offset| offset != 2 || !suppress_far_right)
            .filter_map(|&offset| x.checked_add_signed(offset))
            .filter(|&nx| nx < self.width && !self.chained_next[nx + PAD])
            .collect();

        if candidates.is_empty() {
            return Ok(());
        }

        let wanted = target
            .and_then(|t| t.next)
            .and_then(|next| candidates.iter().position(|&nx| next[nx] == color));

        if !coder.code(context, wanted.is_some())? {
            return Ok(());
        }

        let mut choice = candidates.len() - 1;
        for j in 0..candidates.len() - 1 {
            if coder.code(CHAIN_CHOICE + j.min(3), wanted == Some(j))? {
                choice = j;
                break;
            }
        }

        let nx = candidates[choice] + PAD;
        self.chained_next[nx] = true;
        self.below[nx] = color;
        self.stats.chain_links += 1;

        Ok(())
    }

    /// Code the color of the change point at padded position `i`.
    fn code_color<C: Coder>(&mut self, coder: &mut C, i: usize, wanted: Option<u32>) -> Result<u32> {
        let above = self.above[i];
        let left = self.line[i - 1];
        let bucket = self.format.bucket(above);

        let index = wanted.and_then(|c| self.cache.find(bucket, c));
        let hit_context = usize::from(self.cache.hit_contexts[bucket]);
        let hit = coder.code(hit_context, index.is_some())?;

        if hit {
            self.cache.hit_contexts[bucket] = CACHE_HIT;
            self.stats.cache_hits += 1;

            let index = code_nn(coder, CACHE_INDEX, index.unwrap_or(0) as u32)? as usize;
            if index >= CACHE_SIZE {
                bail!(Pic2Error::CorruptFile);
            }

            return Ok(self.cache.promote(bucket, index));
        }

        self.cache.hit_contexts[bucket] = CACHE_MISS;
        self.stats.explicit_colors += 1;

        let max = self.format.max();
        let [pr, pg, pb] = self.format.split(self.format.average(above, left));
        let [wr, wg, wb] = self.format.split(wanted.unwrap_or(0));

        let g = unfold(code_nn(coder, GREEN, fold(wg, pg, max))?, pg, max)?;
        let delta = i64::from(g) - i64::from(pg);

        let bef = |p: u32| (i64::from(p) + delta).clamp(0, i64::from(max)) as u32;
        let (br, bb) = (bef(pr), bef(pb));

        let r = unfold(code_nn(coder, RED, fold(wr, br, max))?, br, max)?;
        let b = unfold(code_nn(coder, BLUE, fold(wb, bb, max))?, bb, max)?;

        let color = self.format.join([r, g, b]);
        self.cache.insert(bucket, color);

        Ok(color)
    }
}

#[inline]
fn bump(counter: &mut u8, by: u8) {
    *counter = counter.saturating_add(by);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache_with(colors: &[u32]) -> ColorCache {
        let mut cache = ColorCache::new();
        for &color in colors.iter().rev() {
            cache.insert(0, color);
        }
        cache
    }

    fn logical(cache: &ColorCache, len: usize) -> Vec<u32> {
        (0..len)
            .map(|i| cache.entries[0][cache.slot(0, i)])
            .collect()
    }

    #[test]
    fn cache_insert_and_find() {
        let cache = cache_with(&[10, 11, 12]);
        assert_eq!(logical(&cache, 4), [10, 11, 12, 0]);
        assert_eq!(cache.find(0, 12), Some(2));
        assert_eq!(cache.find(0, 13), None);
        assert_eq!(cache.find(1, 0), Some(0));
    }

    #[test]
    fn cache_promotion_rotates_three_entries() {
        let mut cache = cache_with(&[10, 11, 12, 13, 14]);
        assert_eq!(cache.promote(0, 4), 14);
        assert_eq!(logical(&cache, 5), [14, 11, 10, 13, 12]);

        assert_eq!(cache.promote(0, 1), 11);
        assert_eq!(logical(&cache, 5), [11, 14, 10, 13, 12]);

        assert_eq!(cache.promote(0, 0), 11);
        assert_eq!(logical(&cache, 5), [11, 14, 10, 13, 12]);
    }

    #[test]
    fn cache_evicts_the_oldest_color() {
        let colors: Vec<u32> = (1..=CACHE_SIZE as u32 + 1).collect();
        let cache = cache_with(&colors);

        assert_eq!(cache.find(0, 1), Some(0));
        assert_eq!(cache.find(0, CACHE_SIZE as u32), Some(CACHE_SIZE - 1));
        assert_eq!(cache.find(0, CACHE_SIZE as u32 + 1), None);
    }
}
