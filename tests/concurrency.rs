mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use common::{orchestrator, request};

#[test]
fn test_parallel_sources_all_admitted() {
    let orch = Arc::new(orchestrator());

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let orch = Arc::clone(&orch);
            thread::spawn(move || {
                let req = request(&format!("10.2.0.{}", t + 1), 8080).endpoint("/items");
                (0..100).filter(|_| orch.admit_request(&req).allowed).count()
            })
        })
        .collect();

    let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(admitted, 800);
    assert_eq!(orch.events().len(), 800 * 4);
    assert_eq!(orch.rate_limiter().stats().rejections.len(), 0);
}

#[test]
fn test_per_ip_limit_holds_under_contention() {
    let orch = Arc::new(orchestrator());

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let orch = Arc::clone(&orch);
            thread::spawn(move || {
                let req = request("10.3.0.1", 8080);
                (0..50).filter(|_| orch.admit_request(&req).allowed).count()
            })
        })
        .collect();

    let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(admitted, 100);
}

#[test]
fn test_no_admission_after_lockdown_returns() {
    let orch = Arc::new(orchestrator());
    let stop = Arc::new(AtomicBool::new(false));

    let workers: Vec<_> = (0..4)
        .map(|t| {
            let orch = Arc::clone(&orch);
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                let req = request(&format!("192.168.5.{}", t + 1), 443);
                while !stop.load(Ordering::Relaxed) {
                    orch.admit_request(&req);
                    thread::sleep(Duration::from_millis(1));
                }
            })
        })
        .collect();

    thread::sleep(Duration::from_millis(20));
    orch.emergency_lockdown();

    for t in 0..4 {
        let decision = orch.admit_request(&request(&format!("192.168.5.{}", t + 1), 443));
        assert!(!decision.allowed);
    }

    stop.store(true, Ordering::Relaxed);
    for worker in workers {
        worker.join().unwrap();
    }
}

#[tokio::test]
async fn test_background_tasks_start_and_stop() {
    let orch = Arc::new(orchestrator());

    assert!(orch.start_background_tasks());
    assert!(orch.background_tasks_running());
    assert!(orch.rate_limiter().is_sweeping());

    orch.stop_background_tasks();
    assert!(!orch.background_tasks_running());
    assert!(!orch.rate_limiter().is_sweeping());

    orch.emergency_lockdown();
    assert!(!orch.start_background_tasks());
}

#[test]
fn test_injection_never_admitted_across_lockdown() {
    for round in 0..50u32 {
        let orch = Arc::new(orchestrator());
        let workers: Vec<_> = (0..6u32)
            .map(|t| {
                let orch = Arc::clone(&orch);
                thread::spawn(move || {
                    (0..20u32)
                        .filter(|i| {
                            let n = round * 1000 + t * 100 + i;
                            let source = format!("100.{}.{}.{}", 64 + n / 65536 % 64, n / 256 % 256, n % 256);
                            let req = request(&source, 443).payload("'; DROP TABLE users; --");
                            orch.admit_request(&req).allowed
                        })
                        .count()
                })
            })
            .collect();

        orch.emergency_lockdown();

        let admitted: usize = workers.into_iter().map(|w| w.join().unwrap()).sum();
        assert_eq!(admitted, 0, "round {}", round);
    }
}
