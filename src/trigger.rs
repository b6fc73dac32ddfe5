// Key and pointer position to layer index.

/// The visual surface in host coordinates. Bounds are inclusive on every edge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceRect {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

impl SurfaceRect {
    pub fn new(left: f32, top: f32, width: f32, height: f32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    pub fn from_size(width: f32, height: f32) -> Self {
        Self::new(0.0, 0.0, width, height)
    }

    pub fn right(&self) -> f32 {
        self.left + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.top + self.height
    }

    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.left && x <= self.right() && y >= self.top && y <= self.bottom()
    }
}

/// `cols x rows` cells covering the surface, enough for every layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridPartition {
    pub cols: usize,
    pub rows: usize,
}

impl GridPartition {
    /// Zero layers still get one (empty) cell.
    pub fn for_layers(layers: usize) -> Self {
        let cells = layers.max(1);
        let cols = (cells as f64).sqrt().ceil() as usize;
        let rows = cells.div_ceil(cols);
        Self { cols, rows }
    }

    pub fn cell_size(&self, width: f32, height: f32) -> (f32, f32) {
        (width / self.cols as f32, height / self.rows as f32)
    }

    /// Column and row of cell `index`, row-major.
    pub fn cell_of(&self, index: usize) -> (usize, usize) {
        (index % self.cols, index / self.cols)
    }

    /// Center of cell `index` relative to the surface origin.
    pub fn cell_center(&self, index: usize, width: f32, height: f32) -> (f32, f32) {
        let (cell_w, cell_h) = self.cell_size(width, height);
        let (col, row) = self.cell_of(index);
        (
            cell_w * col as f32 + cell_w / 2.0,
            cell_h * row as f32 + cell_h / 2.0,
        )
    }

    /// Cell index under a surface-local point. Edges clamp to the last column/row.
    pub fn index_at(&self, local_x: f32, local_y: f32, width: f32, height: f32) -> usize {
        let (cell_w, cell_h) = self.cell_size(width, height);
        let col = clamp_cell(local_x, cell_w, self.cols);
        let row = clamp_cell(local_y, cell_h, self.rows);
        row * self.cols + col
    }
}

fn clamp_cell(offset: f32, cell: f32, count: usize) -> usize {
    if !(cell > 0.0) || offset <= 0.0 {
        return 0;
    }
    ((offset / cell).floor() as usize).min(count - 1)
}

/// Stateless mapping from inputs to layer indices for a fixed layer count.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerMapper {
    keys: Vec<char>,
    grid: GridPartition,
    layer_count: usize,
}

impl TriggerMapper {
    pub fn new(keys: Vec<char>, layer_count: usize) -> Self {
        Self {
            keys: keys.into_iter().map(|c| c.to_ascii_lowercase()).collect(),
            grid: GridPartition::for_layers(layer_count),
            layer_count,
        }
    }

    pub fn layer_count(&self) -> usize {
        self.layer_count
    }

    pub fn grid(&self) -> GridPartition {
        self.grid
    }

    /// Layers past the end of the key list are pointer-only.
    pub fn layer_for_key(&self, key: char) -> Option<usize> {
        let key = key.to_ascii_lowercase();
        self.keys
            .iter()
            .take(self.layer_count)
            .position(|&k| k == key)
    }

    pub fn key_for_layer(&self, layer: usize) -> Option<char> {
        if layer < self.layer_count {
            self.keys.get(layer).copied()
        } else {
            None
        }
    }

    /// Keys bound to a layer, in layer order.
    pub fn mapped_keys(&self) -> impl Iterator<Item = (usize, char)> + '_ {
        self.keys
            .iter()
            .copied()
            .take(self.layer_count)
            .enumerate()
    }

    /// Layer under a point in host coordinates, `None` outside the surface or
    /// over an empty trailing cell.
    pub fn layer_at(&self, rect: &SurfaceRect, x: f32, y: f32) -> Option<usize> {
        if !rect.contains(x, y) {
            return None;
        }
        let index = self
            .grid
            .index_at(x - rect.left, y - rect.top, rect.width, rect.height);
        (index < self.layer_count).then_some(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys() -> Vec<char> {
        "kbshjfld".chars().collect()
    }

    #[test]
    fn grid_dimensions() {
        assert_eq!(GridPartition::for_layers(0), GridPartition { cols: 1, rows: 1 });
        assert_eq!(GridPartition::for_layers(1), GridPartition { cols: 1, rows: 1 });
        assert_eq!(GridPartition::for_layers(3), GridPartition { cols: 2, rows: 2 });
        assert_eq!(GridPartition::for_layers(5), GridPartition { cols: 3, rows: 2 });
        assert_eq!(GridPartition::for_layers(8), GridPartition { cols: 3, rows: 3 });
    }

    #[test]
    fn grid_always_covers_layers() {
        for n in 0..=8 {
            let grid = GridPartition::for_layers(n);
            assert!(grid.cols * grid.rows >= n.max(1), "n = {n}");
        }
    }

    #[test]
    fn every_inside_point_maps_in_range() {
        let rect = SurfaceRect::new(10.0, 20.0, 300.0, 200.0);
        for n in 0..=8 {
            let mapper = TriggerMapper::new(keys(), n);
            for xi in 0..=30 {
                for yi in 0..=20 {
                    let x = rect.left + xi as f32 * 10.0;
                    let y = rect.top + yi as f32 * 10.0;
                    if let Some(i) = mapper.layer_at(&rect, x, y) {
                        assert!(i < n);
                    }
                }
            }
            assert_eq!(mapper.layer_at(&rect, 9.9, 50.0), None);
            assert_eq!(mapper.layer_at(&rect, 50.0, 220.5), None);
        }
    }

    #[test]
    fn edges_are_inclusive_and_clamped() {
        let rect = SurfaceRect::from_size(100.0, 100.0);
        let mapper = TriggerMapper::new(keys(), 4);
        assert_eq!(mapper.layer_at(&rect, 0.0, 0.0), Some(0));
        assert_eq!(mapper.layer_at(&rect, 100.0, 100.0), Some(3));
        assert_eq!(mapper.layer_at(&rect, 75.0, 25.0), Some(1));
    }

    #[test]
    fn empty_trailing_cell_is_no_layer() {
        let rect = SurfaceRect::from_size(100.0, 100.0);
        let mapper = TriggerMapper::new(keys(), 3);
        assert_eq!(mapper.layer_at(&rect, 25.0, 75.0), Some(2));
        assert_eq!(mapper.layer_at(&rect, 75.0, 75.0), None);

        let empty = TriggerMapper::new(keys(), 0);
        assert_eq!(empty.layer_at(&rect, 50.0, 50.0), None);
    }

    #[test]
    fn keys_zip_against_layers() {
        let mapper = TriggerMapper::new(keys(), 3);
        assert_eq!(mapper.layer_for_key('k'), Some(0));
        assert_eq!(mapper.layer_for_key('S'), Some(2));
        assert_eq!(mapper.layer_for_key('h'), None);
        assert_eq!(mapper.key_for_layer(1), Some('b'));
        assert_eq!(mapper.key_for_layer(3), None);

        let wide = TriggerMapper::new(vec!['k', 'b'], 4);
        assert_eq!(wide.key_for_layer(3), None);
        assert_eq!(wide.mapped_keys().count(), 2);
    }

    #[test]
    fn cell_centers() {
        let grid = GridPartition::for_layers(4);
        assert_eq!(grid.cell_center(0, 200.0, 100.0), (50.0, 25.0));
        assert_eq!(grid.cell_center(3, 200.0, 100.0), (150.0, 75.0));
    }
}
