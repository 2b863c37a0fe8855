use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use qarma_register::collapse::MultiDimCriteria;
use qarma_register::config::QarmaConfig;
use qarma_register::error::{QarmaError, Result};
use qarma_register::error_report;
use qarma_register::logging::init_logging;
use qarma_register::{
    AiObserver, CollapseStrategy, MessageBus, MessageType, PredictiveScheduler, QuantumRegister,
    BROADCAST,
};

const WAIT_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = env::args().nth(1).map(PathBuf::from);
    let config = QarmaConfig::load(config_path.as_deref())
        .map_err(|e| QarmaError::Config(format!("{:#}", e)))?;

    init_logging(&config.logging)?;

    info!("Starting QARMA register demo v{}", env!("CARGO_PKG_VERSION"));
    info!("Platform: {} / {}", env::consts::OS, env::consts::ARCH);

    let session_id = uuid::Uuid::new_v4().to_string();
    info!("Session ID: {}", session_id);

    let config = Arc::new(config);
    let observer = Arc::new(AiObserver::new(config.observer.clone()));

    let scenarios: [(&str, Scenario); 5] = [
        ("square numbers", square_numbers),
        ("range sum", range_sum),
        ("algorithm race", algorithm_race),
        ("predictive scheduling", predictive_scheduling),
        ("cross-learning search", cross_learning_search),
    ];

    let mut failures = 0;
    for (name, scenario) in scenarios {
        debug!("Running scenario: {}", name);
        if let Err(e) = run_scenario(name, scenario, config.clone(), observer.clone()).await {
            failures += 1;
            let hint = e.user_message();
            let report = error_report!(e, format!("Scenario '{}' failed", name))
                .with_correlation_id(session_id.clone())
                .with_component("demo".to_string());
            error!("{}", report.format_for_log());
            warn!("{}: {}", name, hint);
        }
    }

    observer.print_stats();
    let probe = QuantumRegister::<u64>::new(8)?;
    info!(
        "Recommended strategy for a fresh 8-qubit workload: {:?}",
        observer.recommend_for(&probe)
    );

    if failures > 0 {
        warn!("{} scenario(s) failed", failures);
    }
    info!("Demo complete");
    Ok(())
}

type Scenario = fn(&QarmaConfig, &AiObserver) -> Result<String>;

/// Run one blocking scenario off the async runtime
async fn run_scenario(
    name: &'static str,
    scenario: Scenario,
    config: Arc<QarmaConfig>,
    observer: Arc<AiObserver>,
) -> Result<()> {
    let task = tokio::task::spawn_blocking(move || scenario(&config, &observer));
    let summary = tokio::time::timeout(WAIT_TIMEOUT, task)
        .await
        .map_err(|_| QarmaError::Internal(format!("{} timed out", name)))?
        .map_err(|e| QarmaError::Internal(format!("{} panicked: {}", name, e)))??;
    info!("[{}] {}", name, summary);
    Ok(())
}

/// Squares of 1..=8 combined into one sum
fn square_numbers(config: &QarmaConfig, observer: &AiObserver) -> Result<String> {
    let mut reg = QuantumRegister::<u64>::with_config(8, &config.register)?;
    for i in 0..8 {
        let n = i as u64 + 1;
        reg.qubit_init(
            i,
            move |out: &mut u64| {
                *out = n * n;
                Ok(())
            },
            0,
            8,
        )?;
    }
    reg.set_combine(|results: &[&u64], out: &mut u64| *out = results.iter().copied().sum());
    reg.set_strategy(CollapseStrategy::Combine);

    let ticket = observer.observe_start(&reg);
    reg.execute()?;
    reg.wait(WAIT_TIMEOUT)?;
    let sum = *reg.collapse()?;
    observer.observe_finish(&ticket, &reg, 1.0);
    Ok(format!("sum of squares = {}", sum))
}

/// 0..100 split into ten ranges, summed in parallel
fn range_sum(config: &QarmaConfig, observer: &AiObserver) -> Result<String> {
    let mut register_config = config.register.clone();
    register_config.dispatch = qarma_register::register::DispatchMode::Parallel;
    let mut reg = QuantumRegister::<u64>::with_config(10, &register_config)?;
    for i in 0..10 {
        let start = i as u64 * 10;
        reg.qubit_init(
            i,
            move |out: &mut u64| {
                *out = (start..start + 10).sum();
                Ok(())
            },
            0,
            8,
        )?;
    }
    reg.set_combine(|results: &[&u64], out: &mut u64| *out = results.iter().copied().sum());
    reg.set_strategy(CollapseStrategy::Combine);

    let handle = reg.completion_handle();
    let ticket = observer.observe_start(&reg);
    reg.execute()?;
    handle.wait(WAIT_TIMEOUT)?;
    let sum = *reg.collapse()?;
    observer.observe_finish(&ticket, &reg, 1.0);
    Ok(format!("sum 0..100 = {} ({})", sum, reg.stats().completed_qubits))
}

/// Three "algorithms" race; the evaluator keeps the cheapest answer
fn algorithm_race(config: &QarmaConfig, observer: &AiObserver) -> Result<String> {
    let costs = [(37i64, 5u64), (12, 9), (25, 2)];
    let mut reg = QuantumRegister::<i64>::with_config(costs.len(), &config.register)?;
    for (i, &(cost, delay)) in costs.iter().enumerate() {
        reg.qubit_init(
            i,
            move |out: &mut i64| {
                std::thread::sleep(Duration::from_millis(delay));
                *out = cost;
                Ok(())
            },
            0,
            16,
        )?;
    }
    reg.set_evaluate(|cost: &i64| -(*cost as i32));
    reg.set_multidim(MultiDimCriteria {
        quality: Some(Arc::new(|cost: &i64| 100 - *cost as i32)),
        speed: None,
        resource: None,
        quality_weight: 2,
        speed_weight: 0,
        resource_weight: 1,
    });

    let mut lines = Vec::new();
    for strategy in [CollapseStrategy::Best, CollapseStrategy::MultiDim, CollapseStrategy::Fuzzy] {
        reg.reset();
        reg.set_strategy(strategy);
        let ticket = observer.observe_start(&reg);
        reg.execute()?;
        let winner = *reg.collapse()?;
        observer.observe_finish(&ticket, &reg, if winner == 12 { 1.0 } else { 0.5 });
        lines.push(format!("{:?}={}", strategy, winner));
    }
    Ok(lines.join(" "))
}

/// Learn qubit durations over two rounds and dispatch longest-first
fn predictive_scheduling(config: &QarmaConfig, _observer: &AiObserver) -> Result<String> {
    let scheduler = PredictiveScheduler::new(config.scheduler.clone());
    let mut reg = QuantumRegister::<u64>::with_config(4, &config.register)?;
    for (i, size) in [64usize, 512, 128, 1024].into_iter().enumerate() {
        reg.qubit_init(
            i,
            move |out: &mut u64| {
                std::thread::sleep(Duration::from_millis(size as u64 / 64));
                *out = size as u64;
                Ok(())
            },
            0,
            size,
        )?;
    }
    reg.set_wait_all(false);

    for _ in 0..2 {
        reg.reset();
        scheduler.predict(&reg);
        match scheduler.get_order(&reg) {
            Some(order) => reg.execute_ordered(&order)?,
            None => reg.execute()?,
        };
        scheduler.learn(&reg);
    }
    let stats = scheduler.print_stats();
    Ok(format!(
        "order={:?} patterns={} accurate={}",
        scheduler.get_order(&reg).unwrap_or_default(),
        stats.pattern_count,
        stats.predictions_accurate
    ))
}

/// Qubits scan disjoint ranges for a target and share their best guess
fn cross_learning_search(config: &QarmaConfig, _observer: &AiObserver) -> Result<String> {
    const TARGET: u64 = 7_777;
    let bus = Arc::new(MessageBus::new(config.bus.clone()));
    let mut reg = QuantumRegister::<u64>::with_config(8, &config.register)?;

    for i in 0..8u32 {
        let bus = bus.clone();
        let start = i as u64 * 1_250;
        reg.qubit_init(
            i as usize,
            move |out: &mut u64| {
                if let Some(winner) = bus.check_convergence() {
                    debug!("Qubit {} sees convergence from qubit {}", i, winner);
                    bus.mark_helpful();
                }
                let best = (start..start + 1_250)
                    .min_by_key(|n| n.abs_diff(TARGET))
                    .unwrap_or(start);
                *out = best;
                let quality = u32::MAX - best.abs_diff(TARGET) as u32;
                if let Err(e) = bus.broadcast_best(i, &best.to_le_bytes(), quality) {
                    warn!("Qubit {} could not broadcast: {}", i, e);
                }
                bus.send(i, MessageType::PartialResult, &best.to_le_bytes(), BROADCAST)?;
                Ok(())
            },
            0,
            8,
        )?;
    }
    reg.set_evaluate(|n: &u64| -(n.abs_diff(TARGET).min(i32::MAX as u64) as i32));
    reg.set_strategy(CollapseStrategy::Best);

    reg.execute()?;
    let found = *reg.collapse()?;
    let converged = bus.check_convergence();
    while bus.receive(u32::MAX).is_some() {}
    let stats = bus.print_stats();
    bus.clear();
    Ok(format!(
        "found {} (converged on qubit {:?}, {} messages)",
        found, converged, stats.messages_sent
    ))
}
