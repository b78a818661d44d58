//! Grid composition of per-camera tiles into one RGBA8 canvas.
//!
//! Cell `(row, col)` shows logical camera `first_index + row * cols + col`
//! at pixel offset `(col * tile_width, row * tile_height)`. A tile that fails
//! to grab stays black; it never aborts the composite.

use super::error::{GrabberError, Result};
use super::types::FrameShape;

/// Arrangement of cameras in a composite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridLayout {
    pub cols: u32,
    pub rows: u32,
    pub tile_width: u32,
    pub tile_height: u32,
    /// Logical index shown in the top-left cell.
    pub first_index: usize,
    /// Cells at or past this many cameras are left black.
    pub camera_count: usize,
}

/// One cell of a [`GridLayout`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridCell {
    pub row: u32,
    pub col: u32,
    pub index: usize,
}

impl GridLayout {
    /// A full `cols x rows` grid starting at camera 0.
    pub fn new(cols: u32, rows: u32, tile_width: u32, tile_height: u32) -> Self {
        Self {
            cols,
            rows,
            tile_width,
            tile_height,
            first_index: 0,
            camera_count: cols as usize * rows as usize,
        }
    }

    /// Enough rows of `cols` cells to show `camera_count` cameras.
    pub fn for_cameras(camera_count: usize, cols: u32, tile_width: u32, tile_height: u32) -> Self {
        let cols = cols.max(1);
        let rows = camera_count.div_ceil(cols as usize) as u32;
        Self {
            cols,
            rows,
            tile_width,
            tile_height,
            first_index: 0,
            camera_count,
        }
    }

    /// Shift every cell's logical index by `first_index`.
    pub fn starting_at(mut self, first_index: usize) -> Self {
        self.first_index = first_index;
        self
    }

    /// Canvas geometry, checking that every input is positive.
    pub fn canvas_shape(&self) -> Result<FrameShape> {
        if self.cols == 0
            || self.rows == 0
            || self.tile_width == 0
            || self.tile_height == 0
            || self.camera_count == 0
        {
            return Err(GrabberError::InvalidRequest(format!(
                "grid {}x{} of {}x{} tiles for {} cameras must be positive",
                self.cols, self.rows, self.tile_width, self.tile_height, self.camera_count
            )));
        }
        let width = self.cols.checked_mul(self.tile_width);
        let height = self.rows.checked_mul(self.tile_height);
        match (width, height) {
            (Some(w), Some(h)) => Ok(FrameShape::mono(w, h)),
            _ => Err(GrabberError::InvalidRequest(
                "grid canvas size overflows".to_string(),
            )),
        }
    }

    /// Validate the layout against a destination of `dst_len` bytes.
    pub fn validate(&self, dst_len: usize) -> Result<FrameShape> {
        let canvas = self.canvas_shape()?;
        super::acquisition::validate_request(canvas.width, canvas.height, dst_len)
    }

    /// Cells that show a camera, in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = GridCell> + '_ {
        (0..self.rows)
            .flat_map(move |row| (0..self.cols).map(move |col| (row, col)))
            .map(|(row, col)| (row, col, row as usize * self.cols as usize + col as usize))
            .take_while(|&(_, _, n)| n < self.camera_count)
            .map(|(row, col, n)| GridCell {
                row,
                col,
                index: self.first_index + n,
            })
    }

    /// Logical index of the last camera shown.
    pub fn last_index(&self) -> usize {
        let shown = self
            .camera_count
            .min(self.cols as usize * self.rows as usize);
        self.first_index + shown.saturating_sub(1)
    }

    pub fn tile_shape(&self) -> FrameShape {
        FrameShape::mono(self.tile_width, self.tile_height)
    }
}

/// Which cameras made it into a composite.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GridReport {
    pub filled: Vec<usize>,
    pub failed: Vec<(usize, String)>,
}

/// Copy an RGBA8 tile into a larger canvas, one row at a time.
pub fn blit_tile(
    canvas: &mut [u8],
    canvas_width: u32,
    tile: &[u8],
    tile_width: u32,
    tile_height: u32,
    x0: u32,
    y0: u32,
) {
    let row_bytes = tile_width as usize * 4;
    let stride = canvas_width as usize * 4;
    for y in 0..tile_height as usize {
        let src = &tile[y * row_bytes..(y + 1) * row_bytes];
        let start = (y0 as usize + y) * stride + x0 as usize * 4;
        canvas[start..start + row_bytes].copy_from_slice(src);
    }
}

/// Compose a grid into `dst`, grabbing each tile with `grab_tile`.
///
/// Fails without touching `dst` when the layout is invalid or `dst` is too
/// small. Otherwise the canvas is zero-filled first and tile failures are
/// collected in the report.
pub fn compose<F>(layout: &GridLayout, dst: &mut [u8], mut grab_tile: F) -> Result<GridReport>
where
    F: FnMut(usize, &mut [u8]) -> Result<()>,
{
    let canvas = layout.validate(dst.len())?;
    let canvas_bytes = &mut dst[..canvas.rgba_len()];
    canvas_bytes.fill(0);

    let mut tile = vec![0u8; layout.tile_shape().rgba_len()];
    let mut report = GridReport::default();

    for cell in layout.cells() {
        match grab_tile(cell.index, &mut tile) {
            Ok(()) => {
                blit_tile(
                    canvas_bytes,
                    canvas.width,
                    &tile,
                    layout.tile_width,
                    layout.tile_height,
                    cell.col * layout.tile_width,
                    cell.row * layout.tile_height,
                );
                report.filled.push(cell.index);
            }
            Err(e) => {
                tracing::debug!(
                    "Grid cell {} (camera {}) left black: {e}",
                    cell.row * layout.cols + cell.col,
                    cell.index
                );
                report.failed.push((cell.index, e.to_string()));
            }
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Tile whose every pixel encodes the camera index.
    fn fill_tile(index: usize, tile: &mut [u8]) {
        for px in tile.chunks_exact_mut(4) {
            px.copy_from_slice(&[index as u8 + 1, 0, 0, 255]);
        }
    }

    #[test]
    fn cells_are_row_major() {
        let layout = GridLayout::new(3, 2, 1, 1);
        let indices: Vec<(u32, u32, usize)> =
            layout.cells().map(|c| (c.row, c.col, c.index)).collect();
        assert_eq!(
            indices,
            vec![
                (0, 0, 0),
                (0, 1, 1),
                (0, 2, 2),
                (1, 0, 3),
                (1, 1, 4),
                (1, 2, 5)
            ]
        );
    }

    #[test]
    fn for_cameras_rounds_rows_up() {
        let layout = GridLayout::for_cameras(24, 5, 8, 8);
        assert_eq!(layout.rows, 5);
        assert_eq!(layout.cells().count(), 24);
        assert_eq!(layout.last_index(), 23);
    }

    #[test]
    fn starting_at_offsets_indices() {
        let layout = GridLayout::new(2, 1, 1, 1).starting_at(10);
        let indices: Vec<usize> = layout.cells().map(|c| c.index).collect();
        assert_eq!(indices, vec![10, 11]);
        assert_eq!(layout.last_index(), 11);
    }

    #[test]
    fn places_tiles_without_overlap() {
        let layout = GridLayout::new(2, 2, 4, 3);
        let mut dst = vec![0xEE; 8 * 6 * 4];
        let report = compose(&layout, &mut dst, |index, tile| {
            fill_tile(index, tile);
            Ok(())
        })
        .unwrap();
        assert_eq!(report.filled, vec![0, 1, 2, 3]);

        for y in 0..6usize {
            for x in 0..8usize {
                let expected = (y / 3) * 2 + (x / 4);
                let offset = (y * 8 + x) * 4;
                assert_eq!(dst[offset], expected as u8 + 1, "pixel ({x}, {y})");
            }
        }
    }

    #[test]
    fn failed_tile_stays_black() {
        let layout = GridLayout::new(2, 2, 4, 3);
        let mut dst = vec![0xEE; 8 * 6 * 4];
        let report = compose(&layout, &mut dst, |index, tile| {
            if index == 2 {
                return Err(GrabberError::Acquisition("timeout".into()));
            }
            fill_tile(index, tile);
            Ok(())
        })
        .unwrap();
        assert_eq!(report.filled, vec![0, 1, 3]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, 2);

        for y in 3..6usize {
            for x in 0..4usize {
                let offset = (y * 8 + x) * 4;
                assert_eq!(&dst[offset..offset + 4], &[0, 0, 0, 0]);
            }
        }
    }

    #[test]
    fn undersized_destination_is_untouched() {
        let layout = GridLayout::new(2, 2, 4, 3);
        let mut dst = vec![0xEE; 8 * 6 * 4 - 1];
        let mut calls = 0;
        let result = compose(&layout, &mut dst, |_, _| {
            calls += 1;
            Ok(())
        });
        assert!(matches!(result, Err(GrabberError::InvalidRequest(_))));
        assert_eq!(calls, 0);
        assert!(dst.iter().all(|&b| b == 0xEE));
    }

    #[test]
    fn zero_dimension_is_rejected() {
        assert!(GridLayout::new(0, 2, 4, 3).canvas_shape().is_err());
        assert!(GridLayout::new(2, 2, 4, 0).canvas_shape().is_err());
        assert_eq!(
            GridLayout::new(2, 2, 4, 3).canvas_shape().unwrap(),
            FrameShape::mono(8, 6)
        );
    }

    #[test]
    fn cells_beyond_camera_count_stay_black() {
        let layout = GridLayout::for_cameras(3, 2, 1, 1);
        let mut dst = vec![0xEE; 2 * 2 * 4];
        let report = compose(&layout, &mut dst, |index, tile| {
            fill_tile(index, tile);
            Ok(())
        })
        .unwrap();
        assert_eq!(report.filled, vec![0, 1, 2]);
        assert_eq!(&dst[12..16], &[0, 0, 0, 0]);
    }

    #[test]
    fn blit_respects_canvas_stride() {
        let mut canvas = vec![0u8; 3 * 2 * 4];
        let tile = vec![7u8; 4];
        blit_tile(&mut canvas, 3, &tile, 1, 1, 2, 1);
        assert_eq!(&canvas[20..24], &[7, 7, 7, 7]);
        assert_eq!(canvas.iter().filter(|&&b| b == 7).count(), 4);
    }
}
