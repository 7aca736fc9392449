//! Time-alignment of per-sweep inputs arriving as separate messages.

use crate::core::types::{ImuSweepState, PointCloud3D, SweepFeatures};
use serde::{Deserialize, Serialize};

/// Configuration for the sweep synchronizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynchronizerConfig {
    /// Inputs whose timestamps agree within this epsilon belong to the same
    /// sweep (seconds).
    pub sync_epsilon: f64,

    /// Duration of one full sweep in seconds. Buffered inputs older than
    /// the newest one by more than this are stale.
    pub scan_period: f64,
}

impl Default for SynchronizerConfig {
    fn default() -> Self {
        Self {
            sync_epsilon: 0.005,
            scan_period: 0.1,
        }
    }
}

#[derive(Debug, Clone)]
struct Slot<T> {
    time: f64,
    data: T,
}

/// Buffers up to one instance of each of the six per-sweep inputs and
/// releases them as a bundle once all carry the same timestamp.
///
/// Duplicate timestamps, stale stragglers and out-of-order sweeps are
/// dropped and counted rather than propagated.
#[derive(Debug, Default)]
pub struct SweepSynchronizer {
    config: SynchronizerConfig,
    corner_sharp: Option<Slot<PointCloud3D>>,
    corner_less_sharp: Option<Slot<PointCloud3D>>,
    surface_flat: Option<Slot<PointCloud3D>>,
    surface_less_flat: Option<Slot<PointCloud3D>>,
    full_resolution: Option<Slot<PointCloud3D>>,
    imu: Option<Slot<ImuSweepState>>,
    last_released: Option<f64>,
    dropped: u64,
}

impl SweepSynchronizer {
    /// Create a synchronizer.
    pub fn new(config: SynchronizerConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Inputs dropped as duplicate, stale or out-of-order so far.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Clear all pending inputs.
    pub fn clear(&mut self) {
        self.corner_sharp = None;
        self.corner_less_sharp = None;
        self.surface_flat = None;
        self.surface_less_flat = None;
        self.full_resolution = None;
        self.imu = None;
    }

    /// Offer the sharp corner cloud of a sweep.
    pub fn offer_corner_sharp(&mut self, cloud: PointCloud3D, time: f64) {
        if self.admit(time, self.corner_sharp.as_ref().map(|s| s.time), "corner_sharp") {
            self.corner_sharp = Some(Slot { time, data: cloud });
            self.discard_stale();
        }
    }

    /// Offer the less-sharp corner cloud of a sweep.
    pub fn offer_corner_less_sharp(&mut self, cloud: PointCloud3D, time: f64) {
        if self.admit(
            time,
            self.corner_less_sharp.as_ref().map(|s| s.time),
            "corner_less_sharp",
        ) {
            self.corner_less_sharp = Some(Slot { time, data: cloud });
            self.discard_stale();
        }
    }

    /// Offer the flat surface cloud of a sweep.
    pub fn offer_surface_flat(&mut self, cloud: PointCloud3D, time: f64) {
        if self.admit(time, self.surface_flat.as_ref().map(|s| s.time), "surface_flat") {
            self.surface_flat = Some(Slot { time, data: cloud });
            self.discard_stale();
        }
    }

    /// Offer the less-flat surface cloud of a sweep.
    pub fn offer_surface_less_flat(&mut self, cloud: PointCloud3D, time: f64) {
        if self.admit(
            time,
            self.surface_less_flat.as_ref().map(|s| s.time),
            "surface_less_flat",
        ) {
            self.surface_less_flat = Some(Slot { time, data: cloud });
            self.discard_stale();
        }
    }

    /// Offer the full-resolution cloud of a sweep.
    pub fn offer_full_resolution(&mut self, cloud: PointCloud3D, time: f64) {
        if self.admit(
            time,
            self.full_resolution.as_ref().map(|s| s.time),
            "full_resolution",
        ) {
            self.full_resolution = Some(Slot { time, data: cloud });
            self.discard_stale();
        }
    }

    /// Offer the IMU snapshot of a sweep.
    pub fn offer_imu(&mut self, state: ImuSweepState, time: f64) {
        if self.admit(time, self.imu.as_ref().map(|s| s.time), "imu") {
            self.imu = Some(Slot { time, data: state });
            self.discard_stale();
        }
    }

    /// Release the bundled sweep once all six inputs share a timestamp.
    pub fn take_aligned(&mut self) -> Option<SweepFeatures> {
        let reference = self.surface_less_flat.as_ref()?.time;
        let eps = self.config.sync_epsilon;

        let aligned = [
            self.corner_sharp.as_ref().map(|s| s.time),
            self.corner_less_sharp.as_ref().map(|s| s.time),
            self.surface_flat.as_ref().map(|s| s.time),
            self.full_resolution.as_ref().map(|s| s.time),
            self.imu.as_ref().map(|s| s.time),
        ]
        .iter()
        .all(|t| matches!(t, Some(t) if (t - reference).abs() < eps));
        if !aligned {
            return None;
        }

        self.last_released = Some(reference);
        Some(SweepFeatures {
            corner_sharp: self.corner_sharp.take().map(|s| s.data).unwrap_or_default(),
            corner_less_sharp: self
                .corner_less_sharp
                .take()
                .map(|s| s.data)
                .unwrap_or_default(),
            surface_flat: self.surface_flat.take().map(|s| s.data).unwrap_or_default(),
            surface_less_flat: self
                .surface_less_flat
                .take()
                .map(|s| s.data)
                .unwrap_or_default(),
            full_resolution: self
                .full_resolution
                .take()
                .map(|s| s.data)
                .unwrap_or_default(),
            imu: self.imu.take().map(|s| s.data).unwrap_or_default(),
            time: reference,
        })
    }

    /// Gate an incoming input: drops duplicates of a pending slot and
    /// anything older than the last released sweep.
    fn admit(&mut self, time: f64, pending: Option<f64>, what: &str) -> bool {
        let eps = self.config.sync_epsilon;
        if let Some(released) = self.last_released {
            if time <= released + eps {
                self.dropped += 1;
                log::warn!(
                    "dropping out-of-order {} at t={:.3} (last released t={:.3})",
                    what,
                    time,
                    released
                );
                return false;
            }
        }
        if let Some(pending_time) = pending {
            if (time - pending_time).abs() < eps {
                self.dropped += 1;
                log::warn!("dropping duplicate {} at t={:.3}", what, time);
                return false;
            }
            // A newer instance displaces a pending one that never completed.
            self.dropped += 1;
            log::debug!(
                "replacing unconsumed {} from t={:.3} with t={:.3}",
                what,
                pending_time,
                time
            );
        }
        true
    }

    /// Discard buffered inputs older than the newest by more than one sweep.
    fn discard_stale(&mut self) {
        let newest = [
            self.corner_sharp.as_ref().map(|s| s.time),
            self.corner_less_sharp.as_ref().map(|s| s.time),
            self.surface_flat.as_ref().map(|s| s.time),
            self.surface_less_flat.as_ref().map(|s| s.time),
            self.full_resolution.as_ref().map(|s| s.time),
            self.imu.as_ref().map(|s| s.time),
        ]
        .into_iter()
        .flatten()
        .fold(f64::NEG_INFINITY, f64::max);

        let horizon = newest - self.config.scan_period;
        let dropped = &mut self.dropped;
        let mut expire_cloud = |slot: &mut Option<Slot<PointCloud3D>>, what: &str| {
            if let Some(s) = slot {
                if s.time < horizon {
                    log::warn!("discarding stale {} from t={:.3}", what, s.time);
                    *slot = None;
                    *dropped += 1;
                }
            }
        };
        expire_cloud(&mut self.corner_sharp, "corner_sharp");
        expire_cloud(&mut self.corner_less_sharp, "corner_less_sharp");
        expire_cloud(&mut self.surface_flat, "surface_flat");
        expire_cloud(&mut self.surface_less_flat, "surface_less_flat");
        expire_cloud(&mut self.full_resolution, "full_resolution");
        if let Some(s) = &self.imu {
            if s.time < horizon {
                log::warn!("discarding stale imu from t={:.3}", s.time);
                self.imu = None;
                self.dropped += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Point3D;

    fn cloud(tag: f32) -> PointCloud3D {
        let mut c = PointCloud3D::new();
        c.push(Point3D::new(tag, 0.0, 0.0, 0.0));
        c
    }

    fn offer_all(sync: &mut SweepSynchronizer, time: f64) {
        sync.offer_corner_sharp(cloud(1.0), time);
        sync.offer_corner_less_sharp(cloud(2.0), time);
        sync.offer_surface_flat(cloud(3.0), time);
        sync.offer_surface_less_flat(cloud(4.0), time);
        sync.offer_full_resolution(cloud(5.0), time);
        sync.offer_imu(ImuSweepState::default(), time);
    }

    #[test]
    fn test_incomplete_set_is_not_released() {
        let mut sync = SweepSynchronizer::new(SynchronizerConfig::default());
        sync.offer_corner_sharp(cloud(1.0), 0.1);
        sync.offer_surface_less_flat(cloud(4.0), 0.1);
        assert!(sync.take_aligned().is_none());
    }

    #[test]
    fn test_complete_aligned_set_is_released_once() {
        let mut sync = SweepSynchronizer::new(SynchronizerConfig::default());
        offer_all(&mut sync, 0.1);

        let sweep = sync.take_aligned().expect("aligned set must release");
        assert_eq!(sweep.time, 0.1);
        assert_eq!(sweep.corner_sharp.len(), 1);
        assert_eq!(sweep.full_resolution[0].x, 5.0);

        // The slots were consumed.
        assert!(sync.take_aligned().is_none());
    }

    #[test]
    fn test_epsilon_alignment_tolerated() {
        let mut sync = SweepSynchronizer::new(SynchronizerConfig::default());
        sync.offer_corner_sharp(cloud(1.0), 0.1004);
        sync.offer_corner_less_sharp(cloud(2.0), 0.0996);
        sync.offer_surface_flat(cloud(3.0), 0.1);
        sync.offer_surface_less_flat(cloud(4.0), 0.1);
        sync.offer_full_resolution(cloud(5.0), 0.1);
        sync.offer_imu(ImuSweepState::default(), 0.1);
        assert!(sync.take_aligned().is_some());
    }

    #[test]
    fn test_duplicate_timestamp_dropped_and_counted() {
        let mut sync = SweepSynchronizer::new(SynchronizerConfig::default());
        sync.offer_corner_sharp(cloud(1.0), 0.1);
        assert_eq!(sync.dropped(), 0);

        sync.offer_corner_sharp(cloud(9.0), 0.1);
        assert_eq!(sync.dropped(), 1);

        // The original payload survives.
        assert_eq!(sync.corner_sharp.as_ref().unwrap().data[0].x, 1.0);
    }

    #[test]
    fn test_out_of_order_sweep_dropped() {
        let mut sync = SweepSynchronizer::new(SynchronizerConfig::default());
        offer_all(&mut sync, 0.2);
        assert!(sync.take_aligned().is_some());

        sync.offer_corner_sharp(cloud(1.0), 0.1);
        assert_eq!(sync.dropped(), 1);
        assert!(sync.corner_sharp.is_none());
    }

    #[test]
    fn test_stale_partial_set_discarded() {
        let mut sync = SweepSynchronizer::new(SynchronizerConfig::default());
        sync.offer_corner_sharp(cloud(1.0), 0.1);

        // A much newer input expires the pending one.
        sync.offer_surface_less_flat(cloud(4.0), 0.5);
        assert!(sync.corner_sharp.is_none());
        assert_eq!(sync.dropped(), 1);
    }

    #[test]
    fn test_clear_empties_all_slots() {
        let mut sync = SweepSynchronizer::new(SynchronizerConfig::default());
        offer_all(&mut sync, 0.1);
        sync.clear();
        assert!(sync.take_aligned().is_none());
    }
}
