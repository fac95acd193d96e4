//! Bounded uniform sampling of a point stream.
//!
//! Each tree is paired with a [`ReservoirSampler`] that decides which
//! stream points the tree holds. While fewer than `capacity` points are
//! held every point is admitted; afterwards the `n`-th point of the epoch is
//! admitted with probability `capacity / n` and replaces a uniformly chosen
//! member.

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use rcf_common::{Error, Result};

/// Outcome of offering a point to a sampler.
#[derive(Debug, Clone, PartialEq)]
pub enum SampleUpdate {
    /// Added while below capacity.
    Admitted,
    /// Added in place of the returned member.
    AdmittedReplacing(Vec<f64>),
    /// Not sampled.
    Rejected,
}

impl SampleUpdate {
    pub fn is_admitted(&self) -> bool {
        !matches!(self, SampleUpdate::Rejected)
    }
}

/// A drawn but unapplied sampling decision.
///
/// Holds the advanced random stream so that applying it consumes exactly
/// the draws `observe` would have.
#[derive(Debug, Clone)]
pub(crate) struct Offer {
    slot: Slot,
    rng: Option<ChaCha8Rng>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Slot {
    Append,
    Replace(usize),
    Skip,
}

/// Reservoir sampler owning its own random stream.
#[derive(Debug, Clone)]
pub struct ReservoirSampler {
    capacity: usize,
    dimensions: usize,
    seen: u64,
    members: Vec<Vec<f64>>,
    rng: ChaCha8Rng,
}

impl ReservoirSampler {
    pub fn new(capacity: usize, dimensions: usize, rng: ChaCha8Rng) -> Self {
        Self {
            capacity,
            dimensions,
            seen: 0,
            members: Vec::with_capacity(capacity),
            rng,
        }
    }

    /// Rebuild persisted state. Callers validate member counts.
    pub(crate) fn from_parts(
        capacity: usize,
        dimensions: usize,
        seen: u64,
        members: Vec<Vec<f64>>,
        rng: ChaCha8Rng,
    ) -> Self {
        Self {
            capacity,
            dimensions,
            seen,
            members,
            rng,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Points observed in the current epoch.
    pub fn seen(&self) -> u64 {
        self.seen
    }

    /// Current sample, in slot order.
    pub fn members(&self) -> &[Vec<f64>] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub(crate) fn rng(&self) -> &ChaCha8Rng {
        &self.rng
    }

    pub(crate) fn rng_mut(&mut self) -> &mut ChaCha8Rng {
        &mut self.rng
    }

    /// Offer a point.
    ///
    /// A point of the wrong dimensionality fails with
    /// [`Error::DimensionMismatch`] before any state changes.
    pub fn observe(&mut self, point: &[f64]) -> Result<SampleUpdate> {
        let offer = self.offer(point)?;
        Ok(self.accept(offer, point))
    }

    /// Draw the decision for `point` without applying it.
    pub(crate) fn offer(&self, point: &[f64]) -> Result<Offer> {
        if point.len() != self.dimensions {
            return Err(Error::DimensionMismatch {
                expected: self.dimensions,
                actual: point.len(),
            });
        }

        if self.members.len() < self.capacity {
            return Ok(Offer {
                slot: Slot::Append,
                rng: None,
            });
        }

        let mut rng = self.rng.clone();
        let slot = rng.random_range(0..self.seen + 1);
        let slot = if slot < self.capacity as u64 {
            Slot::Replace(slot as usize)
        } else {
            Slot::Skip
        };
        Ok(Offer {
            slot,
            rng: Some(rng),
        })
    }

    /// Member an offer would push out, if any.
    pub(crate) fn evictee(&self, offer: &Offer) -> Option<&[f64]> {
        match offer.slot {
            Slot::Replace(slot) => self.members.get(slot).map(Vec::as_slice),
            Slot::Append | Slot::Skip => None,
        }
    }

    /// Apply an offer drawn by [`offer`](Self::offer) on this exact state.
    pub(crate) fn accept(&mut self, offer: Offer, point: &[f64]) -> SampleUpdate {
        self.seen += 1;
        if let Some(rng) = offer.rng {
            self.rng = rng;
        }
        match offer.slot {
            Slot::Append => {
                self.members.push(point.to_vec());
                SampleUpdate::Admitted
            }
            Slot::Replace(slot) => {
                let evicted = std::mem::replace(&mut self.members[slot], point.to_vec());
                SampleUpdate::AdmittedReplacing(evicted)
            }
            Slot::Skip => SampleUpdate::Rejected,
        }
    }

    /// Install a batch-drawn sample standing in for `seen` observations.
    pub(crate) fn seed_sample(&mut self, members: Vec<Vec<f64>>, seen: u64) {
        self.members = members;
        self.seen = seen;
    }

    /// Start a new sampling epoch: the count restarts and every member is
    /// dropped, so the sample only ever holds points of the current epoch.
    pub fn reset_epoch(&mut self) {
        self.seen = 0;
        self.members.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn sampler(capacity: usize) -> ReservoirSampler {
        ReservoirSampler::new(capacity, 1, ChaCha8Rng::seed_from_u64(17))
    }

    #[test]
    fn admits_until_full() {
        let mut s = sampler(3);
        for i in 0..3 {
            assert_eq!(s.observe(&[i as f64]).unwrap(), SampleUpdate::Admitted);
        }
        assert_eq!(s.len(), 3);
        assert_eq!(s.seen(), 3);
    }

    #[test]
    fn never_exceeds_capacity() {
        let mut s = sampler(5);
        for i in 0..1000 {
            let update = s.observe(&[i as f64]).unwrap();
            if let SampleUpdate::AdmittedReplacing(evicted) = update {
                assert!(evicted[0] < i as f64);
            }
            assert!(s.len() <= 5);
        }
        assert_eq!(s.len(), 5);
        assert_eq!(s.seen(), 1000);
    }

    #[test]
    fn dimension_mismatch_leaves_state() {
        let mut s = sampler(2);
        s.observe(&[1.0]).unwrap();
        let err = s.observe(&[1.0, 2.0]).unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { .. }));
        assert_eq!(s.seen(), 1);
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn admission_rate_matches_capacity_over_n() {
        // Past capacity, point n is admitted with probability C / n.
        let trials = 4000;
        let mut admitted_at_20 = 0;
        for seed in 0..trials {
            let mut s = ReservoirSampler::new(5, 1, ChaCha8Rng::seed_from_u64(seed));
            for i in 0..19 {
                s.observe(&[i as f64]).unwrap();
            }
            if s.observe(&[19.0]).unwrap().is_admitted() {
                admitted_at_20 += 1;
            }
        }
        let rate = admitted_at_20 as f64 / trials as f64;
        assert!((rate - 0.25).abs() < 0.03, "rate {rate}");
    }

    #[test]
    fn sample_is_uniform_over_stream() {
        let mut counts = [0usize; 10];
        for seed in 0..3000 {
            let mut s = ReservoirSampler::new(2, 1, ChaCha8Rng::seed_from_u64(seed));
            for i in 0..10 {
                s.observe(&[i as f64]).unwrap();
            }
            for m in s.members() {
                counts[m[0] as usize] += 1;
            }
        }
        // Each value is expected 3000 * 2 / 10 = 600 times.
        for (value, &c) in counts.iter().enumerate() {
            assert!((500..700).contains(&c), "value {value} kept {c} times");
        }
    }

    #[test]
    fn offer_is_pure_until_accepted() {
        let mut s = sampler(2);
        for i in 0..6 {
            s.observe(&[i as f64]).unwrap();
        }
        let twin = s.clone();

        let offer = s.offer(&[50.0]).unwrap();
        let _ = s.offer(&[50.0]).unwrap();
        assert_eq!(s.seen(), 6);
        assert_eq!(s.members(), twin.members());

        let evictee = s.evictee(&offer).map(<[f64]>::to_vec);
        let update = s.accept(offer, &[50.0]);
        let mut twin = twin;
        assert_eq!(update, twin.observe(&[50.0]).unwrap());
        assert_eq!(s.members(), twin.members());
        match update {
            SampleUpdate::AdmittedReplacing(evicted) => assert_eq!(Some(evicted), evictee),
            _ => assert_eq!(evictee, None),
        }
    }

    #[test]
    fn reset_epoch_drops_old_members() {
        let mut s = sampler(2);
        for i in 0..10 {
            s.observe(&[i as f64]).unwrap();
        }
        s.reset_epoch();
        assert_eq!(s.seen(), 0);
        assert!(s.is_empty());
        assert_eq!(s.observe(&[99.0]).unwrap(), SampleUpdate::Admitted);
        assert_eq!(s.members(), &[vec![99.0]]);
    }

    #[test]
    fn new_epoch_sample_holds_only_new_points() {
        let mut stale = 0;
        for seed in 0..500 {
            let mut s = ReservoirSampler::new(4, 1, ChaCha8Rng::seed_from_u64(seed));
            for i in 0..100 {
                s.observe(&[i as f64]).unwrap();
            }
            s.reset_epoch();
            for i in 0..8 {
                s.observe(&[1000.0 + i as f64]).unwrap();
            }
            assert_eq!(s.len(), 4);
            stale += s.members().iter().filter(|m| m[0] < 1000.0).count();
        }
        assert_eq!(stale, 0);
    }
}
