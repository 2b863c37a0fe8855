//! Shared fixtures for integration tests
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use qarma_register::register::{ParallelDispatcher, QubitData};
use qarma_register::{ManualClock, QuantumRegister};

/// Register whose qubit `i` writes `values[i]`
pub fn value_register<T: QubitData>(values: &[T]) -> QuantumRegister<T> {
    let mut reg = QuantumRegister::new(values.len()).expect("non-empty register");
    for (i, value) in values.iter().enumerate() {
        let value = value.clone();
        reg.qubit_init(
            i,
            move |out: &mut T| {
                *out = value.clone();
                Ok(())
            },
            T::default(),
            std::mem::size_of::<T>(),
        )
        .expect("index in range");
    }
    reg.set_wait_all(false);
    reg
}

/// Value register already executed
pub fn executed<T: QubitData>(values: &[T]) -> QuantumRegister<T> {
    let mut reg = value_register(values);
    reg.execute().expect("execute");
    reg
}

/// Register on a manual clock; qubit `i` advances it by `costs[i]` ms and
/// writes its cost
pub fn timed_register(clock: &Arc<ManualClock>, costs: &[u64]) -> QuantumRegister<u64> {
    let mut reg = QuantumRegister::new(costs.len())
        .expect("non-empty register")
        .with_clock(clock.clone());
    for (i, &cost) in costs.iter().enumerate() {
        let clock = clock.clone();
        reg.qubit_init(
            i,
            move |out: &mut u64| {
                clock.advance(cost);
                *out = cost;
                Ok(())
            },
            0,
            8,
        )
        .expect("index in range");
    }
    reg
}

/// Parallel register whose qubit `i` sleeps `delays_ms[i]` and writes `i`
pub fn racing_register(delays_ms: &[u64]) -> QuantumRegister<usize> {
    let dispatcher = ParallelDispatcher::with_threads(delays_ms.len().max(2), 0).expect("thread pool");
    let mut reg = QuantumRegister::new(delays_ms.len())
        .expect("non-empty register")
        .with_dispatcher(Arc::new(dispatcher));
    for (i, &delay) in delays_ms.iter().enumerate() {
        reg.qubit_init(
            i,
            move |out: &mut usize| {
                std::thread::sleep(Duration::from_millis(delay));
                *out = i;
                Ok(())
            },
            usize::MAX,
            8,
        )
        .expect("index in range");
    }
    reg.set_wait_all(false);
    reg
}

/// Shared invocation counter
#[derive(Clone, Default)]
pub struct CallCounter(Arc<AtomicUsize>);

impl CallCounter {
    pub fn hit(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}
