use crate::batch::job::SampleClass;

/// Decision of the workload strategy for one sample class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResubmitThreshold {
    /// No resubmission is currently justified, there is no usable signal yet.
    Never,
    /// Jobs older than this many milliseconds are eligible for a backup copy.
    After(u64),
}

impl ResubmitThreshold {
    pub fn exceeded_by(&self, age: u64) -> bool {
        match self {
            ResubmitThreshold::Never => false,
            ResubmitThreshold::After(t) => age > *t,
        }
    }
}

/// Decides, from observed completion statistics, past which elapsed time a
/// still-running job should be considered slow enough to hedge with a
/// duplicate submission.
pub trait WorkloadStrategy: Send {
    fn resubmit_after(
        &self,
        class: SampleClass,
        finished: &[u64],
        running: &[u64],
    ) -> ResubmitThreshold;
}

/// Dichotomic search for the threshold `t` at which the estimated fraction of
/// jobs exceeding `t` matches the configured oversubmission ratio of the
/// class.
///
/// At a candidate `t` the estimate combines the finished jobs that took at
/// least `t` with a projection for the running jobs that are still younger
/// than `t`: each such job contributes the fraction of finished jobs at least
/// as old as itself that ended up slow. Without that correction the raw count
/// undercounts risk, because young running jobs have not had time to reveal
/// themselves as slow.
#[derive(Debug, Clone)]
pub struct DichotomicStrategy {
    ratio_waiting: f64,
    ratio_running: f64,
    epsilon: f64,
}

impl DichotomicStrategy {
    pub fn new(ratio_waiting: f64, ratio_running: f64, epsilon: f64) -> Self {
        DichotomicStrategy {
            ratio_waiting,
            ratio_running,
            epsilon,
        }
    }

    pub fn from_config(config: &crate::common::config::OversubmissionConfig) -> Self {
        Self::new(config.ratio_waiting, config.ratio_running, config.epsilon)
    }

    fn ratio(&self, class: SampleClass) -> f64 {
        match class {
            SampleClass::Waiting => self.ratio_waiting,
            SampleClass::Running => self.ratio_running,
        }
    }
}

impl Default for DichotomicStrategy {
    fn default() -> Self {
        DichotomicStrategy::new(0.5, 0.05, 0.01)
    }
}

/// Number of elements of a sorted sample that are `>= t`.
fn count_at_least(sorted: &[u64], t: u64) -> usize {
    sorted.len() - sorted.partition_point(|&value| value < t)
}

/// Estimated proportion of jobs, finished and projected-running, that exceed
/// the split time `t`.
fn proportion_above(finished: &[u64], running: &[u64], t: u64) -> f64 {
    let n1 = count_at_least(finished, t);
    let n2 = finished.len();
    let n3 = count_at_least(running, t);
    let n4 = running.len();

    let mut projected = n3 as f64;
    for &age in running.iter().take_while(|&&age| age < t) {
        // `age < t <= max(finished)` guarantees a non-zero divisor.
        let at_least_as_old = count_at_least(finished, age);
        projected += n1 as f64 / at_least_as_old as f64;
    }

    (n1 as f64 + projected) / (n2 + n4) as f64
}

impl WorkloadStrategy for DichotomicStrategy {
    fn resubmit_after(
        &self,
        class: SampleClass,
        finished: &[u64],
        running: &[u64],
    ) -> ResubmitThreshold {
        let mut finished = finished.to_vec();
        let mut running = running.to_vec();
        finished.sort_unstable();
        running.sort_unstable();

        if finished.is_empty() || running.is_empty() {
            return ResubmitThreshold::Never;
        }

        let ratio = self.ratio(class);
        let mut tmin = finished[0];
        let mut tmax = finished[finished.len() - 1];
        // Last midpoint at which the proportion was below the ratio but still
        // positive. Returned when the search ends out of tolerance, so that
        // the chosen threshold never flags every running job at once.
        let mut last_above_zero = None;

        let (t, p) = loop {
            let t = (tmax + tmin) / 2;
            let p = proportion_above(&finished, &running, t);

            if p < ratio {
                if p > 0.0 {
                    last_above_zero = Some(t);
                }
                tmax = t;
            } else {
                tmin = t;
            }

            if tmax - tmin <= 1 || (p - ratio).abs() <= self.epsilon {
                break (t, p);
            }
        };

        let threshold = if (p - ratio).abs() > self.epsilon {
            match last_above_zero {
                Some(t) => ResubmitThreshold::After(t),
                None => ResubmitThreshold::Never,
            }
        } else {
            ResubmitThreshold::After(t)
        };
        log::debug!(
            "Oversubmission threshold for the {class} class: {threshold:?} \
             (ratio={ratio}, finished={}, running={})",
            finished.len(),
            running.len()
        );
        threshold
    }
}
