//! Job registry: FIFO admission plus id-keyed state
//!
//! Every known id lives in one [`DashMap`] slot that is either pending
//! (still queued) or tracked (running or terminal). Claiming a job rewrites
//! its slot in place under the shard lock, so a concurrent reader sees the
//! id as queued or as running, never as missing.
//!
//! Terminal results are evicted after a retention period; status lookups
//! for evicted ids fall back to the artifacts on disk.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;

use super::job::{Job, JobId, JobResult, JobState};

enum JobSlot {
    Pending(Arc<Job>),
    Tracked {
        result: JobResult,
        finished_at: Option<Instant>,
    },
}

#[derive(Default)]
pub struct JobRegistry {
    slots: DashMap<JobId, JobSlot>,
    queue: Mutex<VecDeque<JobId>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit a job at the back of the queue. Never blocks on workers.
    pub fn enqueue(&self, job: Job) -> JobId {
        let id = job.id.clone();
        self.slots.insert(id.clone(), JobSlot::Pending(Arc::new(job)));
        self.queue.lock().push_back(id.clone());
        id
    }

    /// Claim the oldest queued job and mark it running.
    pub fn claim_next(&self) -> Option<Arc<Job>> {
        loop {
            let id = self.queue.lock().pop_front()?;

            let Some(mut slot) = self.slots.get_mut(&id) else {
                continue;
            };
            let JobSlot::Pending(job) = &*slot else {
                continue;
            };
            let job = Arc::clone(job);
            *slot = JobSlot::Tracked {
                result: JobResult::running(&job.owner),
                finished_at: None,
            };
            return Some(job);
        }
    }

    /// Record the terminal result for a running job. Terminal results are
    /// never overwritten.
    pub fn complete(&self, id: &str, result: JobResult) {
        debug_assert!(result.state.is_terminal());
        if let Some(mut slot) = self.slots.get_mut(id) {
            if let JobSlot::Tracked { result: current, .. } = &*slot
                && current.state.is_terminal()
            {
                tracing::warn!(job_id = id, "Ignoring second terminal result");
                return;
            }
            *slot = JobSlot::Tracked {
                result,
                finished_at: Some(Instant::now()),
            };
        }
    }

    pub fn lookup(&self, id: &str) -> Option<JobResult> {
        self.slots.get(id).map(|slot| match &*slot {
            JobSlot::Pending(job) => JobResult::queued(&job.owner),
            JobSlot::Tracked { result, .. } => result.clone(),
        })
    }

    /// Forget terminal results older than `retention`. Queued and running
    /// jobs are never evicted.
    pub fn evict_finished(&self, retention: Duration) -> usize {
        let before = self.slots.len();
        self.slots.retain(|_, slot| match slot {
            JobSlot::Tracked {
                finished_at: Some(at),
                ..
            } => at.elapsed() < retention,
            _ => true,
        });
        before.saturating_sub(self.slots.len())
    }

    pub fn queued_len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn count_in(&self, state: JobState) -> usize {
        self.slots
            .iter()
            .filter(|entry| match entry.value() {
                JobSlot::Pending(_) => state == JobState::Queued,
                JobSlot::Tracked { result, .. } => result.state == state,
            })
            .count()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;
    use crate::data::artifacts::ArtifactPaths;
    use crate::domain::reports::ReportSpec;

    fn job(owner: &str) -> Job {
        Job::new(owner, false, "sales", ReportSpec::new(&[], &["revenue"]))
    }

    fn paths() -> ArtifactPaths {
        ArtifactPaths {
            csv: "a.csv".into(),
            xlsx: "a.xlsx".into(),
        }
    }

    #[test]
    fn test_fifo_claim_order() {
        let registry = JobRegistry::new();
        let a = registry.enqueue(job("alice"));
        let b = registry.enqueue(job("bob"));
        let c = registry.enqueue(job("carol"));

        assert_eq!(registry.claim_next().unwrap().id, a);
        assert_eq!(registry.claim_next().unwrap().id, b);
        assert_eq!(registry.claim_next().unwrap().id, c);
        assert!(registry.claim_next().is_none());
    }

    #[test]
    fn test_state_transitions_preserve_owner() {
        let registry = JobRegistry::new();
        let id = registry.enqueue(job("alice"));
        assert_eq!(registry.lookup(&id).unwrap().state, JobState::Queued);

        registry.claim_next().unwrap();
        let running = registry.lookup(&id).unwrap();
        assert_eq!(running.state, JobState::Running);
        assert_eq!(running.owner, "alice");

        registry.complete(&id, JobResult::finished_ok("alice", paths(), 3));
        let done = registry.lookup(&id).unwrap();
        assert_eq!(done.state, JobState::FinishedOk);
        assert_eq!(done.rows, Some(3));
    }

    #[test]
    fn test_terminal_result_not_overwritten() {
        let registry = JobRegistry::new();
        let id = registry.enqueue(job("alice"));
        registry.claim_next().unwrap();
        registry.complete(&id, JobResult::finished_error("alice", "boom"));
        registry.complete(&id, JobResult::finished_ok("alice", paths(), 0));
        assert_eq!(registry.lookup(&id).unwrap().state, JobState::FinishedError);
    }

    #[test]
    fn test_evict_finished_keeps_live_jobs() {
        let registry = JobRegistry::new();
        let done = registry.enqueue(job("alice"));
        let running = registry.enqueue(job("bob"));
        let queued = registry.enqueue(job("carol"));
        registry.claim_next().unwrap();
        registry.claim_next().unwrap();
        registry.complete(&done, JobResult::finished_ok("alice", paths(), 1));

        assert_eq!(registry.evict_finished(Duration::from_secs(3600)), 0);
        assert!(registry.lookup(&done).is_some());

        assert_eq!(registry.evict_finished(Duration::ZERO), 1);
        assert!(registry.lookup(&done).is_none());
        assert_eq!(registry.lookup(&running).unwrap().state, JobState::Running);
        assert_eq!(registry.lookup(&queued).unwrap().state, JobState::Queued);
        assert_eq!(registry.claim_next().unwrap().id, queued);
    }

    #[test]
    fn test_unknown_id() {
        assert!(JobRegistry::new().lookup("nope").is_none());
    }

    #[test]
    fn test_counts() {
        let registry = JobRegistry::new();
        registry.enqueue(job("a"));
        registry.enqueue(job("b"));
        registry.claim_next().unwrap();
        assert_eq!(registry.queued_len(), 1);
        assert_eq!(registry.count_in(JobState::Queued), 1);
        assert_eq!(registry.count_in(JobState::Running), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_claims_are_exclusive_and_never_lose_ids() {
        const JOBS: usize = 500;
        let registry = Arc::new(JobRegistry::new());
        let ids: Vec<JobId> = (0..JOBS).map(|_| registry.enqueue(job("alice"))).collect();

        let stop = Arc::new(AtomicBool::new(false));
        let reader = {
            let registry = Arc::clone(&registry);
            let ids = ids.clone();
            let stop = Arc::clone(&stop);
            tokio::spawn(async move {
                while !stop.load(Ordering::Relaxed) {
                    for id in &ids {
                        assert!(registry.lookup(id).is_some(), "id vanished mid-claim");
                    }
                    tokio::task::yield_now().await;
                }
            })
        };

        let mut workers = Vec::new();
        for _ in 0..8 {
            let registry = Arc::clone(&registry);
            workers.push(tokio::spawn(async move {
                let mut claimed = Vec::new();
                while let Some(job) = registry.claim_next() {
                    claimed.push(job.id.clone());
                    tokio::task::yield_now().await;
                }
                claimed
            }));
        }

        let mut all = Vec::new();
        for w in workers {
            all.extend(w.await.unwrap());
        }
        stop.store(true, Ordering::Relaxed);
        reader.await.unwrap();

        assert_eq!(all.len(), JOBS);
        let unique: HashSet<&JobId> = all.iter().collect();
        assert_eq!(unique.len(), JOBS);
        for id in &ids {
            assert_eq!(registry.lookup(id).unwrap().state, JobState::Running);
        }
    }
}
