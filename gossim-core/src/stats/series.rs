use crate::time::TimeInstant;

/// A time series of counter values, ordered by instant, at most one point
/// per instant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Series {
    points: Vec<(TimeInstant, u64)>,
}

impl Series {
    pub fn points(&self) -> &[(TimeInstant, u64)] {
        &self.points
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn last(&self) -> Option<(TimeInstant, u64)> {
        self.points.last().copied()
    }

    /// Sum of every point.
    pub fn total(&self) -> u64 {
        self.points.iter().map(|(_, value)| value).sum()
    }

    /// Add `value` to the point at `instant`.
    pub(crate) fn add(&mut self, instant: TimeInstant, value: u64) {
        self.seed(instant);
        if let Some((last, current)) = self.points.last_mut()
            && *last == instant
        {
            *current += value;
            return;
        }
        self.insert(instant, value);
    }

    /// Set the point at `instant` to `value`.
    pub(crate) fn set(&mut self, instant: TimeInstant, value: u64) {
        self.seed(instant);
        self.insert(instant, value);
    }

    /// The first point of a series comes right after a zero, so the curve
    /// starts from the ground instead of out of nowhere.
    fn seed(&mut self, instant: TimeInstant) {
        if self.points.is_empty() && instant > TimeInstant::ZERO {
            self.points.push((instant.saturating_sub_nanos(1), 0));
        }
    }

    fn insert(&mut self, instant: TimeInstant, value: u64) {
        match self.points.binary_search_by_key(&instant, |(at, _)| *at) {
            Ok(index) => self.points[index].1 = value,
            Err(index) => self.points.insert(index, (instant, value)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(ns: u64) -> TimeInstant {
        TimeInstant::from_nanos(ns)
    }

    #[test]
    fn first_point_is_seeded() {
        let mut series = Series::default();
        series.add(at(100), 3);
        assert_eq!(series.points(), [(at(99), 0), (at(100), 3)]);

        series.add(at(200), 1);
        assert_eq!(series.points().len(), 3);
        assert_eq!(series.total(), 4);
    }

    #[test]
    fn no_seed_at_time_zero() {
        let mut series = Series::default();
        series.set(TimeInstant::ZERO, 2);
        assert_eq!(series.points(), [(TimeInstant::ZERO, 2)]);
    }

    #[test]
    fn same_instant_is_merged() {
        let mut series = Series::default();
        series.add(at(100), 3);
        series.add(at(100), 2);
        assert_eq!(series.last(), Some((at(100), 5)));

        series.set(at(100), 7);
        assert_eq!(series.last(), Some((at(100), 7)));
        assert_eq!(series.points().len(), 2);
    }
}
