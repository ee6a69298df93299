//! Unquantized element conversion

use crate::grid::{GroupOut, Lane, Shape};
use crate::store::{OutputStore, SourceScalar};

pub const THREADS: usize = 256;
pub const SPAN: usize = THREADS;

/// One element per lane
pub fn convert_unary<S: SourceScalar, T: OutputStore>(
    src: &[u8],
    shape: &Shape,
    lane: Lane,
    out: &mut GroupOut<'_, T>,
) {
    let i = THREADS * lane.group + lane.thread;
    if i >= shape.k {
        return;
    }
    out.put(lane.thread, S::read(&src[S::WIDTH * i..]));
}
