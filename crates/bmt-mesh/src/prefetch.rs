//! Background warming of the fragment store.
//!
//! Reading fragment geometry for the first time can stall the calling
//! thread on disk I/O. A [`FragmentPrefetcher`] moves those reads onto a
//! small worker pool: submit the fragment ids of an extracted cut, keep
//! rendering, and collect the outcomes each frame via
//! [`drain_results`](FragmentPrefetcher::drain_results).

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::JoinHandle;

use crate::error::FragmentError;
use crate::mesh::MultiresolutionMesh;

/// Outcome of warming one fragment.
#[derive(Debug)]
pub struct PrefetchResult {
    pub fragment_id: u32,
    /// `Ok` once the geometry is resident in the store.
    pub outcome: Result<(), FragmentError>,
}

/// Worker pool that loads fragment geometry into the store's resident cache.
pub struct FragmentPrefetcher {
    /// Channel sender for submitting fragment ids to workers.
    task_sender: Option<crossbeam_channel::Sender<u32>>,
    /// Channel receiver for collecting outcomes on the calling thread.
    result_receiver: crossbeam_channel::Receiver<PrefetchResult>,
    /// Handles to the worker threads (for shutdown).
    worker_handles: Vec<JoinHandle<()>>,
    /// Maximum number of fragments queued or loading at once.
    budget: usize,
    in_flight: Arc<AtomicUsize>,
}

impl FragmentPrefetcher {
    /// Spawn `worker_count` threads reading through `mesh`'s store, accepting
    /// at most `budget` outstanding fragments.
    pub fn new(mesh: Arc<MultiresolutionMesh>, worker_count: usize, budget: usize) -> Self {
        let (task_tx, task_rx) = crossbeam_channel::bounded::<u32>(budget.max(1));
        let (result_tx, result_rx) = crossbeam_channel::unbounded();
        let in_flight = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::with_capacity(worker_count);
        for i in 0..worker_count {
            let rx = task_rx.clone();
            let tx = result_tx.clone();
            let mesh = Arc::clone(&mesh);
            let flight = Arc::clone(&in_flight);

            let spawned = std::thread::Builder::new()
                .name(format!("bmt-prefetch-{i}"))
                .spawn(move || {
                    while let Ok(fragment_id) = rx.recv() {
                        // The handle is dropped right away; the geometry stays
                        // resident until the store evicts it.
                        let outcome = mesh.fetch_geometry(fragment_id).map(drop);
                        if let Err(err) = &outcome {
                            tracing::warn!(fragment = fragment_id, error = %err, "prefetch failed");
                        }
                        let _ = tx.send(PrefetchResult {
                            fragment_id,
                            outcome,
                        });
                        flight.fetch_sub(1, Ordering::AcqRel);
                    }
                });
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(err) => tracing::warn!(worker = i, error = %err, "failed to spawn prefetch worker"),
            }
        }

        Self {
            task_sender: Some(task_tx),
            result_receiver: result_rx,
            worker_handles: handles,
            budget,
            in_flight,
        }
    }

    /// Queue one fragment. Returns `false` if the budget is exhausted or the
    /// prefetcher has been shut down.
    pub fn submit(&self, fragment_id: u32) -> bool {
        let Some(sender) = &self.task_sender else {
            return false;
        };
        let reserved = self
            .in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.budget).then_some(n + 1)
            });
        if reserved.is_err() {
            return false;
        }
        if sender.send(fragment_id).is_err() {
            self.in_flight.fetch_sub(1, Ordering::AcqRel);
            return false;
        }
        true
    }

    /// Queue fragments until the budget runs out. Returns how many were accepted.
    pub fn submit_all(&self, fragment_ids: impl IntoIterator<Item = u32>) -> usize {
        fragment_ids
            .into_iter()
            .take_while(|&id| self.submit(id))
            .count()
    }

    /// Collect every outcome reported so far without blocking.
    pub fn drain_results(&self) -> Vec<PrefetchResult> {
        let mut results = Vec::new();
        while let Ok(result) = self.result_receiver.try_recv() {
            results.push(result);
        }
        results
    }

    /// Number of fragments queued or being loaded.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Stop accepting work and join the workers after they finish the queue.
    pub fn shutdown(&mut self) {
        self.task_sender.take();
        for handle in self.worker_handles.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for FragmentPrefetcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::{
        ArcSpec, FragmentBlobWriter, FragmentSpec, MeshIndexWriter, NodeSpec, TriangleBatch,
    };
    use crate::{BBox, ByteOrder, FragmentStore, StoreOptions};
    use glam::Vec3;

    /// Root with one arc to a drain; fragments 0..n each carry one triangle.
    /// Fragment `n` points past the end of the blob.
    fn mesh_with_fragments(n: u32) -> Arc<MultiresolutionMesh> {
        let bbox = BBox::new(Vec3::ZERO, Vec3::ONE);
        let batch = TriangleBatch {
            positions: vec![[0.0; 3], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            normals: vec![[0.0, 0.0, 1.0]; 3],
            indices: vec![0, 1, 2],
        };
        let mut blob = FragmentBlobWriter::new(ByteOrder::Little);
        let mut index = MeshIndexWriter::new();
        index.push_node(NodeSpec::new(bbox));
        index.push_node(NodeSpec::new(bbox));
        index.push_arc(ArcSpec::new(0, 1, 0, n, 1.0));
        for _ in 0..n {
            let (offset, len) = blob.push(&batch);
            index.push_fragment(FragmentSpec::new(bbox, 1.0).with_data(offset, len));
        }
        index.push_fragment(FragmentSpec::new(bbox, 1.0).with_data(blob.len() as u64, 96));

        let store = FragmentStore::from_bytes(blob.into_bytes(), StoreOptions::default());
        Arc::new(MultiresolutionMesh::from_parts(&index.to_bytes(ByteOrder::Little), store).unwrap())
    }

    fn collect(prefetcher: &FragmentPrefetcher, expected: usize) -> Vec<PrefetchResult> {
        let mut received = Vec::new();
        let start = std::time::Instant::now();
        while received.len() < expected {
            received.extend(prefetcher.drain_results());
            assert!(start.elapsed().as_secs() < 5, "Timed out");
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
        received
    }

    /// Prefetched fragments become resident in the store.
    #[test]
    fn test_prefetch_warms_store() {
        let mesh = mesh_with_fragments(4);
        let prefetcher = FragmentPrefetcher::new(Arc::clone(&mesh), 2, 16);

        assert_eq!(prefetcher.submit_all(0..4), 4);
        let results = collect(&prefetcher, 4);

        let mut ids: Vec<u32> = results.iter().map(|r| r.fragment_id).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![0, 1, 2, 3]);
        assert!(results.iter().all(|r| r.outcome.is_ok()));
        assert!((0..4).all(|id| mesh.store().is_resident(id)));
    }

    /// Failures are reported per fragment and do not stop the workers.
    #[test]
    fn test_prefetch_reports_failures() {
        let mesh = mesh_with_fragments(1);
        let prefetcher = FragmentPrefetcher::new(Arc::clone(&mesh), 1, 4);

        assert!(prefetcher.submit(1));
        assert!(prefetcher.submit(0));
        let results = collect(&prefetcher, 2);

        let failed = results.iter().find(|r| r.fragment_id == 1).unwrap();
        assert!(matches!(failed.outcome, Err(FragmentError::Io { .. })));
        let ok = results.iter().find(|r| r.fragment_id == 0).unwrap();
        assert!(ok.outcome.is_ok());
    }

    #[test]
    fn test_budget_limits_submissions() {
        let mesh = mesh_with_fragments(8);
        let prefetcher = FragmentPrefetcher::new(mesh, 1, 2);
        let mut accepted = 0;
        for id in 0..8 {
            if prefetcher.submit(id) {
                accepted += 1;
            }
            assert!(prefetcher.in_flight_count() <= 2);
        }
        assert!(accepted >= 2);
    }

    /// Submitters racing on one prefetcher never push it past its budget.
    #[test]
    fn test_budget_holds_under_concurrent_submit() {
        let mesh = mesh_with_fragments(64);
        let prefetcher = FragmentPrefetcher::new(mesh, 2, 3);
        std::thread::scope(|scope| {
            for t in 0..4u32 {
                let prefetcher = &prefetcher;
                scope.spawn(move || {
                    for id in 0..16 {
                        prefetcher.submit(t * 16 + id);
                        assert!(prefetcher.in_flight_count() <= 3);
                    }
                });
            }
        });
    }

    #[test]
    fn test_workers_are_named() {
        let mesh = mesh_with_fragments(1);
        let prefetcher = FragmentPrefetcher::new(mesh, 2, 4);
        let names: Vec<_> = prefetcher
            .worker_handles
            .iter()
            .map(|h| h.thread().name().map(str::to_owned))
            .collect();
        assert_eq!(
            names,
            vec![
                Some("bmt-prefetch-0".to_owned()),
                Some("bmt-prefetch-1".to_owned())
            ]
        );
    }

    #[test]
    fn test_shutdown_rejects_new_work() {
        let mesh = mesh_with_fragments(1);
        let mut prefetcher = FragmentPrefetcher::new(mesh, 1, 4);
        prefetcher.shutdown();
        assert!(!prefetcher.submit(0));
    }
}
