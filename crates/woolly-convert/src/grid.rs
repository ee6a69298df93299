//! Execution grid
//!
//! A launch covers `groups` cooperative groups of `threads` lanes each. Group
//! `g` owns the destination window `[g * span, (g + 1) * span)`, so groups
//! never share output and can run on any pool worker in any order. Lanes of
//! one group run in thread order on the worker that picked the group up.

use rayon::prelude::*;

use crate::store::OutputStore;

/// Grid geometry of one launch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchConfig {
    pub groups: usize,
    pub threads: usize,
    /// Output elements owned by one group
    pub span: usize,
}

impl LaunchConfig {
    /// Enough groups to cover `k` elements, rounding the last group up
    pub fn for_elements(k: usize, threads: usize, span: usize) -> Self {
        Self {
            groups: k.div_ceil(span),
            threads,
            span,
        }
    }

    /// Total lanes launched
    pub fn lanes(&self) -> usize {
        self.groups * self.threads
    }
}

/// Identity of one execution lane
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lane {
    pub group: usize,
    pub thread: usize,
}

/// Shape of the tensor being decoded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shape {
    pub rows: usize,
    pub n_per_row: usize,
    /// Bytes per row including any row metadata
    pub row_size: usize,
    /// Total elements, `rows * n_per_row`
    pub k: usize,
}

/// Destination window of one group
pub struct GroupOut<'a, T> {
    window: &'a mut [T],
    base: usize,
}

impl<'a, T: OutputStore> GroupOut<'a, T> {
    pub fn new(window: &'a mut [T], base: usize) -> Self {
        Self { window, base }
    }

    /// Global index of the first element in the window
    #[inline]
    pub fn base(&self) -> usize {
        self.base
    }

    /// Store `value` at a window-relative index. Positions past the end of
    /// the destination are skipped.
    #[inline]
    pub fn put(&mut self, local: usize, value: f32) {
        if let Some(slot) = self.window.get_mut(local) {
            *slot = T::store(value);
        }
    }

    /// Store `value` at a global element index
    #[inline]
    pub fn put_global(&mut self, index: usize, value: f32) {
        if let Some(local) = index.checked_sub(self.base) {
            self.put(local, value);
        }
    }
}

/// Run `kernel` for every lane of the grid
pub fn run<T, F>(cfg: LaunchConfig, dst: &mut [T], kernel: F)
where
    T: OutputStore,
    F: Fn(Lane, &mut GroupOut<'_, T>) + Sync,
{
    dst.par_chunks_mut(cfg.span)
        .take(cfg.groups)
        .enumerate()
        .for_each(|(group, window)| {
            let mut out = GroupOut::new(window, group * cfg.span);
            for thread in 0..cfg.threads {
                kernel(Lane { group, thread }, &mut out);
            }
        });
}

/// Group-local tile during the load phase. Write-only.
pub struct Staging<'a> {
    words: &'a mut [u32],
}

impl<'a> Staging<'a> {
    #[inline]
    pub fn store(&mut self, index: usize, word: u32) {
        self.words[index] = word;
    }

    /// Barrier between the load and consume phases
    pub fn sync(self) -> Staged<'a> {
        Staged { words: self.words }
    }
}

/// Group-local tile after the barrier. Read-only.
pub struct Staged<'a> {
    words: &'a [u32],
}

impl Staged<'_> {
    #[inline]
    pub fn word(&self, index: usize) -> u32 {
        self.words[index]
    }

    /// Byte `index` of the tile in little-endian word order
    #[inline]
    pub fn byte(&self, index: usize) -> u8 {
        (self.words[index / 4] >> (8 * (index % 4))) as u8
    }
}

/// Run a two-phase kernel: every lane of a group runs `load` into a shared
/// tile of `tile_words` words, then every lane runs `consume` against it.
pub fn run_staged<T, L, C>(cfg: LaunchConfig, tile_words: usize, dst: &mut [T], load: L, consume: C)
where
    T: OutputStore,
    L: Fn(Lane, &mut Staging<'_>) + Sync,
    C: Fn(Lane, &Staged<'_>, &mut GroupOut<'_, T>) + Sync,
{
    dst.par_chunks_mut(cfg.span)
        .take(cfg.groups)
        .enumerate()
        .for_each_init(
            || vec![0u32; tile_words],
            |tile, (group, window)| {
                tile.fill(0);
                let mut staging = Staging { words: tile };
                for thread in 0..cfg.threads {
                    load(Lane { group, thread }, &mut staging);
                }
                let staged = staging.sync();
                let mut out = GroupOut::new(window, group * cfg.span);
                for thread in 0..cfg.threads {
                    consume(Lane { group, thread }, &staged, &mut out);
                }
            },
        );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_elements_rounds_up() {
        let cfg = LaunchConfig::for_elements(1000, 32, 256);
        assert_eq!(cfg.groups, 4);
        assert_eq!(cfg.lanes(), 128);
        assert_eq!(LaunchConfig::for_elements(0, 32, 256).groups, 0);
    }

    #[test]
    fn test_run_writes_each_element_once() {
        let mut dst = vec![0.0f32; 300];
        let cfg = LaunchConfig::for_elements(dst.len(), 4, 64);
        run(cfg, &mut dst, |lane, out| {
            for j in 0..16 {
                let local = 16 * lane.thread + j;
                out.put(local, (out.base() + local) as f32);
            }
        });
        for (i, v) in dst.iter().enumerate() {
            assert_eq!(*v, i as f32);
        }
    }

    #[test]
    fn test_put_skips_out_of_range() {
        let mut dst = vec![-1.0f32; 10];
        let mut out = GroupOut::new(&mut dst[8..], 8);
        out.put(1, 5.0);
        out.put(2, 6.0);
        out.put_global(3, 7.0);
        assert_eq!(dst[9], 5.0);
        assert_eq!(dst[..9].iter().filter(|v| **v != -1.0).count(), 0);
    }

    #[test]
    fn test_staged_tile_is_group_local() {
        let mut dst = vec![0.0f32; 8];
        let cfg = LaunchConfig::for_elements(8, 2, 4);
        run_staged(
            cfg,
            2,
            &mut dst,
            |lane, tile| tile.store(lane.thread, (lane.group * 10 + lane.thread) as u32),
            |lane, tile, out| {
                out.put(2 * lane.thread, tile.word(lane.thread) as f32);
                out.put(2 * lane.thread + 1, tile.byte(4 * (1 - lane.thread)) as f32);
            },
        );
        assert_eq!(dst, vec![0.0, 1.0, 1.0, 0.0, 10.0, 11.0, 11.0, 10.0]);
    }
}
