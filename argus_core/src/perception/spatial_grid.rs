// argus_core/src/perception/spatial_grid.rs

use std::collections::HashMap;

use crate::types::{Pos3, ProviderId};

type Cell = (i32, i32, i32);

/// A uniform grid over provider origins.
///
/// Only an accelerator for area queries: `providers_in_area` always filters
/// candidates by exact distance, so a coarse cell size costs time, not
/// correctness.
#[derive(Debug, Clone)]
pub struct SpatialGrid {
    cell_size: f32,
    cells: HashMap<Cell, Vec<ProviderId>>,
    positions: HashMap<ProviderId, (Cell, Pos3)>,
}

impl SpatialGrid {
    pub fn new(cell_size: f32) -> Self {
        Self {
            cell_size,
            cells: HashMap::new(),
            positions: HashMap::new(),
        }
    }

    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    fn cell_of(&self, position: &Pos3) -> Cell {
        let c = |v: f32| (v / self.cell_size).floor() as i32;
        (c(position.x), c(position.y), c(position.z))
    }

    /// Inserts or moves a provider.
    pub fn update(&mut self, id: ProviderId, position: Pos3) {
        let cell = self.cell_of(&position);
        if let Some((old_cell, old_position)) = self.positions.get_mut(&id) {
            *old_position = position;
            if *old_cell == cell {
                return;
            }
            let previous = std::mem::replace(old_cell, cell);
            Self::detach(&mut self.cells, previous, id);
        } else {
            self.positions.insert(id, (cell, position));
        }
        self.cells.entry(cell).or_default().push(id);
    }

    pub fn remove(&mut self, id: ProviderId) {
        if let Some((cell, _)) = self.positions.remove(&id) {
            Self::detach(&mut self.cells, cell, id);
        }
    }

    fn detach(cells: &mut HashMap<Cell, Vec<ProviderId>>, cell: Cell, id: ProviderId) {
        if let Some(members) = cells.get_mut(&cell) {
            members.retain(|member| *member != id);
            if members.is_empty() {
                cells.remove(&cell);
            }
        }
    }

    pub fn position(&self, id: ProviderId) -> Option<Pos3> {
        self.positions.get(&id).map(|(_, p)| *p)
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Providers within `radius` of `center`, sorted by id.
    ///
    /// Falls back to a linear scan when the query box spans more cells than
    /// are occupied, so the cost never exceeds one pass over the providers.
    pub fn providers_in_area(&self, center: &Pos3, radius: f32) -> Vec<ProviderId> {
        if radius.is_nan() || radius < 0.0 {
            return Vec::new();
        }
        let within = |p: &Pos3| (p - center).norm() <= radius;

        let span_cells = 2.0 * f64::from(radius) / f64::from(self.cell_size) + 2.0;
        let box_cells = span_cells.powi(3);
        let mut found: Vec<ProviderId> = if !box_cells.is_finite() || box_cells > self.cells.len() as f64 {
            self.positions
                .iter()
                .filter(|(_, (_, p))| within(p))
                .map(|(id, _)| *id)
                .collect()
        } else {
            let span = Pos3::new(radius, radius, radius).coords;
            let lo = self.cell_of(&(center - span));
            let hi = self.cell_of(&(center + span));

            let mut found = Vec::new();
            for x in lo.0..=hi.0 {
                for y in lo.1..=hi.1 {
                    for z in lo.2..=hi.2 {
                        let Some(members) = self.cells.get(&(x, y, z)) else {
                            continue;
                        };
                        found.extend(members.iter().copied().filter(|id| {
                            self.positions.get(id).is_some_and(|(_, p)| within(p))
                        }));
                    }
                }
            }
            found
        };
        found.sort_unstable();
        found
    }
}
