use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use log::info;

use kv::config::EngineConfig;
use kv::engine::Engine;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Scenario {
    /// Two transactions cross-lock two keys: exactly one is aborted.
    Deadlock,
    /// Ten transactions touch disjoint keys and all commit.
    Disjoint,
    /// Three transactions form a wait-for cycle: the youngest is aborted.
    Cycle,
}

#[derive(Parser, Debug)]
#[command(author, about = "Drives kv engine concurrency scenarios from the command line")]
struct Args {
    #[arg(value_enum)]
    scenario: Scenario,

    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,
}

fn main() {
    let args = Args::parse();
    init_logging(&args.log_level);

    match args.scenario {
        Scenario::Deadlock => run_deadlock(),
        Scenario::Disjoint => run_disjoint(),
        Scenario::Cycle => run_cycle(),
    }
}

fn init_logging(level: &str) {
    let level = level.parse().unwrap_or(log::LevelFilter::Info);
    let result = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{}] {} [{}] {}",
                chrono::Local::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(level)
        .chain(std::io::stderr())
        .apply();
    if result.is_err() {
        eprintln!("logger has already been set");
    }
}

fn run_deadlock() {
    info!("scenario: deadlock -- two transactions crossing two keys");
    let engine = Engine::new(
        EngineConfig::default()
            .with_max_transactions(4)
            .with_max_keys(4)
            .with_wait_poll_interval(Duration::from_millis(20)),
    );

    let e1 = engine.clone();
    let t1 = thread::spawn(move || {
        let txn = e1.begin().expect("slot available");
        txn.put(b"a", vec![1]).expect("uncontended put");
        thread::sleep(Duration::from_millis(50));
        match txn.put(b"b", vec![1]) {
            Ok(()) => {
                txn.commit().expect("commit");
                "committed"
            }
            Err(err) => {
                info!("side A aborted: {err}");
                txn.abort();
                "aborted"
            }
        }
    });

    let e2 = engine.clone();
    let t2 = thread::spawn(move || {
        let txn = e2.begin().expect("slot available");
        txn.put(b"b", vec![2]).expect("uncontended put");
        thread::sleep(Duration::from_millis(50));
        match txn.put(b"a", vec![2]) {
            Ok(()) => {
                txn.commit().expect("commit");
                "committed"
            }
            Err(err) => {
                info!("side B aborted: {err}");
                txn.abort();
                "aborted"
            }
        }
    });

    let a = t1.join().unwrap();
    let b = t2.join().unwrap();
    println!("side A: {a}, side B: {b}");
    println!("final status: {:?}", engine.status());
}

fn run_disjoint() {
    info!("scenario: disjoint -- ten transactions on distinct keys");
    let engine = Engine::new(EngineConfig::default().with_max_transactions(16).with_max_keys(32));

    let handles: Vec<_> = (0..10u8)
        .map(|i| {
            let engine = engine.clone();
            thread::spawn(move || {
                let txn = engine.begin().expect("slot available");
                txn.put(&[i], vec![i * 2]).expect("uncontended put");
                txn.commit().expect("commit");
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }
    println!("all ten transactions committed");
    println!("final status: {:?}", engine.status());
}

fn run_cycle() {
    info!("scenario: cycle -- three transactions forming a wait-for cycle");
    let engine = Engine::new(
        EngineConfig::default()
            .with_max_transactions(4)
            .with_max_keys(4)
            .with_wait_poll_interval(Duration::from_millis(20)),
    );
    let results = Arc::new(std::sync::Mutex::new(Vec::new()));

    let keys = [(b'a', b'b'), (b'b', b'c'), (b'c', b'a')];
    let handles: Vec<_> = keys
        .into_iter()
        .enumerate()
        .map(|(i, (hold, want))| {
            let engine = engine.clone();
            let results = results.clone();
            thread::spawn(move || {
                let txn = engine.begin().expect("slot available");
                txn.put(&[hold], vec![i as u8]).expect("uncontended put");
                thread::sleep(Duration::from_millis(50));
                let outcome = match txn.put(&[want], vec![i as u8]) {
                    Ok(()) => {
                        txn.commit().expect("commit");
                        "committed"
                    }
                    Err(err) => {
                        info!("member {i} aborted: {err}");
                        txn.abort();
                        "aborted"
                    }
                };
                results.lock().unwrap().push((i, outcome));
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }
    let mut results = results.lock().unwrap();
    results.sort_by_key(|(i, _)| *i);
    for (i, outcome) in results.iter() {
        println!("member {i}: {outcome}");
    }
    println!("final status: {:?}", engine.status());
}
