//! Decorative road traffic shown next to the charts.
//!
//! Vehicle density and speed follow the link status, but nothing here feeds
//! back into the simulation.

use congestion_lab_abstract::LinkStatus;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const ROAD: char = '·';
const VEHICLE: char = '▶';

/// Lanes of vehicles moving left to right.
#[derive(Debug, Clone)]
pub struct TrafficAnimator {
    /// Vehicle positions per lane, front-most first.
    lanes: Vec<Vec<u16>>,
    length: u16,
    rng: StdRng,
}

impl TrafficAnimator {
    pub fn new(lanes: usize, length: u16, seed: u64) -> Self {
        Self {
            lanes: vec![Vec::new(); lanes.max(1)],
            length: length.max(1),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn lane_count(&self) -> usize {
        self.lanes.len()
    }

    pub fn vehicle_count(&self) -> usize {
        self.lanes.iter().map(Vec::len).sum()
    }

    /// Move every vehicle one frame and maybe spawn new ones.
    pub fn advance(&mut self, status: LinkStatus) {
        let (speed, spawn_chance) = match status {
            LinkStatus::Normal => (3, 0.15),
            LinkStatus::Warning => (2, 0.35),
            LinkStatus::Congested => (1, 0.7),
        };
        let length = self.length;

        for lane in &mut self.lanes {
            let mut limit = u16::MAX;
            for pos in lane.iter_mut() {
                // No overtaking: stop right behind the vehicle ahead.
                *pos = pos.saturating_add(speed).min(limit);
                limit = pos.saturating_sub(1);
            }
            lane.retain(|pos| *pos < length);

            let entry_free = lane.last().is_none_or(|back| *back > 0);
            if entry_free && self.rng.random_bool(spawn_chance) {
                lane.push(0);
            }
        }
    }

    /// One text row per lane.
    pub fn render(&self) -> Vec<String> {
        self.lanes
            .iter()
            .map(|lane| {
                let mut row = vec![ROAD; usize::from(self.length)];
                for pos in lane {
                    if let Some(cell) = row.get_mut(usize::from(*pos)) {
                        *cell = VEHICLE;
                    }
                }
                row.into_iter().collect()
            })
            .collect()
    }

    pub fn clear(&mut self) {
        for lane in &mut self.lanes {
            lane.clear();
        }
    }
}
