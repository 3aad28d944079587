use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use ips::engine::{Dequeue, TaskQueue};
use std::collections::VecDeque;
use std::sync::{Arc, Condvar as StdCondvar, Mutex as StdMutex};
use std::thread;
use std::time::Duration;

// Baseline: the same queue on std::sync
#[derive(Debug)]
struct StdQueue<T> {
    state: StdMutex<(VecDeque<T>, bool)>,
    cvar: StdCondvar,
}

impl<T> StdQueue<T> {
    fn new() -> Self {
        Self {
            state: StdMutex::new((VecDeque::new(), false)),
            cvar: StdCondvar::new(),
        }
    }

    fn enqueue_batch(&self, items: impl IntoIterator<Item = T>) {
        let mut state = self.state.lock().unwrap();
        state.0.extend(items);
        self.cvar.notify_all();
    }

    fn dequeue_or_wait(&self, timeout: Duration) -> Option<T> {
        let mut state = self.state.lock().unwrap();
        loop {
            if let Some(item) = state.0.pop_front() {
                return Some(item);
            }
            if state.1 {
                return None;
            }
            state = self.cvar.wait_timeout(state, timeout).unwrap().0;
        }
    }

    fn close(&self) {
        self.state.lock().unwrap().1 = true;
        self.cvar.notify_all();
    }
}

// One producer submitting passes of `tasks` items to `workers` consumers.
fn drain_std(passes: usize, tasks: usize, workers: usize) {
    let queue = Arc::new(StdQueue::new());
    let handles: Vec<_> = (0..workers)
        .map(|_| {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                let mut sum = 0u64;
                while let Some(v) = queue.dequeue_or_wait(Duration::from_millis(5)) {
                    sum += v;
                }
                sum
            })
        })
        .collect();
    for _ in 0..passes {
        queue.enqueue_batch(0..tasks as u64);
    }
    queue.close();
    for h in handles {
        h.join().unwrap();
    }
}

fn drain_task_queue(passes: usize, tasks: usize, workers: usize) {
    let queue = Arc::new(TaskQueue::new());
    let handles: Vec<_> = (0..workers)
        .map(|_| {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                let mut sum = 0u64;
                loop {
                    match queue.dequeue_or_wait(Duration::from_millis(5)) {
                        Dequeue::Item(v) => sum += v,
                        Dequeue::TimedOut => {}
                        Dequeue::Closed => break,
                    }
                }
                sum
            })
        })
        .collect();
    for _ in 0..passes {
        queue.enqueue_batch(0..tasks as u64).unwrap();
    }
    queue.close();
    for h in handles {
        h.join().unwrap();
    }
}

fn bench_contention(c: &mut Criterion) {
    // 16 workers draining 64 passes of 1080 single-row tasks
    let passes = 64;
    let tasks = 1080;
    let workers = 16;

    c.bench_function("std_mutex_queue", |b| {
        b.iter_batched(
            || (),
            |_| drain_std(passes, tasks, workers),
            BatchSize::SmallInput,
        )
    });

    c.bench_function("parking_lot_task_queue", |b| {
        b.iter_batched(
            || (),
            |_| drain_task_queue(passes, tasks, workers),
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(queue_contention, bench_contention);
criterion_main!(queue_contention);
