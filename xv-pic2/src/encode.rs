//! Two-pass encoding of arithmetic-coded blocks.
//!
//! The first pass runs the model over the block without coding anything and
//! only counts the decisions of every context. The counts give the
//! probability table, which is written in front of the block and used by the
//! second pass to actually code the decisions.

use crate::Geometry;
use crate::arith::{ArithEncoder, Coder, StatisticsCollector};
use crate::error::{Pic2Error, Result, bail};
use crate::model::{Model, Target};
use crate::table::ProbabilityTable;
use log::debug;
use xv_common::bit::BitWriter;

/// Check `pixels` against `geometry` and run the model over every row.
fn run_model<C: Coder>(pixels: &[u32], geometry: Geometry, coder: &mut C) -> Result<Model> {
    let format = geometry.color_format()?;
    let (width, height) = (geometry.width as usize, geometry.height as usize);

    if pixels.len() != width * height {
        bail!(Pic2Error::InvalidDimensions);
    }

    if pixels.iter().any(|&p| p > format.pixel_max()) {
        bail!(Pic2Error::PixelOutOfRange);
    }

    let mut model = Model::new(format, width, height);
    let mut rows = pixels.chunks_exact(width).peekable();

    while let Some(row) = rows.next() {
        let target = Target {
            row,
            next: rows.peek().copied(),
        };
        model.code_row(coder, Some(target))?;
    }

    Ok(model)
}

/// Run the statistics pass over a block and derive its probability table.
pub fn collect_statistics(pixels: &[u32], geometry: Geometry) -> Result<ProbabilityTable> {
    let mut collector = StatisticsCollector::new();
    let model = run_model(pixels, geometry, &mut collector)?;

    debug!("collected statistics for block: {:?}", model.stats());

    Ok(collector.into_table())
}

/// Encode a block with a given probability table.
///
/// The output starts with the serialized table, followed by the coded
/// pixels.
pub fn encode_with_table(
    pixels: &[u32],
    geometry: Geometry,
    table: &ProbabilityTable,
) -> Result<Vec<u8>> {
    let out = table.to_bytes().to_vec();
    let mut encoder = ArithEncoder::new(BitWriter::new(out), table);
    let model = run_model(pixels, geometry, &mut encoder)?;
    let carries = encoder.carries();
    let out = encoder.finish()?;

    debug!(
        "encoded {}x{} block into {} bytes with {} carries: {:?}",
        geometry.width,
        geometry.height,
        out.len(),
        carries,
        model.stats()
    );

    Ok(out)
}
