use std::time::{Duration, Instant};

use tokio_postgres::{Config, NoTls};
use ulid::Ulid;

const HOUR: i64 = 3_600_000; // 1 hour in ms

async fn connect(host: &str, port: u16) -> tokio_postgres::Client {
    let mut config = Config::new();
    config
        .host(host)
        .port(port)
        .dbname(format!("bench_{}", Ulid::new()))
        .user("bench")
        .password("valet");

    let (client, conn) = config.connect(NoTls).await.expect("connect failed");
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            eprintln!("connection error: {e}");
        }
    });
    client
}

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn print_latency(label: &str, latencies: &mut [Duration]) {
    latencies.sort();
    let total: Duration = latencies.iter().sum();
    let avg = total / latencies.len() as u32;
    println!("  {label}:");
    println!(
        "    n={}, avg={:.2}ms, p50={:.2}ms, p95={:.2}ms, p99={:.2}ms, max={:.2}ms",
        latencies.len(),
        avg.as_secs_f64() * 1000.0,
        percentile(latencies, 50.0).as_secs_f64() * 1000.0,
        percentile(latencies, 95.0).as_secs_f64() * 1000.0,
        percentile(latencies, 99.0).as_secs_f64() * 1000.0,
        latencies.last().unwrap().as_secs_f64() * 1000.0,
    );
}

async fn register_parking(client: &tokio_postgres::Client) -> Ulid {
    let pid = Ulid::new();
    client
        .batch_execute(&format!("INSERT INTO parkings (id) VALUES ('{pid}')"))
        .await
        .unwrap();
    pid
}

async fn phase1_sequential(host: &str, port: u16) {
    let client = connect(host, port).await;
    let pid = register_parking(&client).await;

    let n = 2000;
    let mut latencies = Vec::with_capacity(n);
    let start = Instant::now();

    for i in 0..n {
        let rid = Ulid::new();
        let s = (i as i64) * HOUR;
        let e = s + HOUR;
        let t = Instant::now();
        client
            .batch_execute(&format!(
                r#"INSERT INTO reservations (id, parking_id, start, "end") VALUES ('{rid}', '{pid}', {s}, {e})"#
            ))
            .await
            .unwrap();
        latencies.push(t.elapsed());
    }

    let elapsed = start.elapsed();
    let ops = n as f64 / elapsed.as_secs_f64();
    println!(
        "  {n} bookings in {:.2}s = {ops:.0} ops/sec",
        elapsed.as_secs_f64()
    );
    print_latency("write latency", &mut latencies);
}

async fn phase2_concurrent_disjoint(host: &str, port: u16) {
    let n_tasks = 10;
    let n_per_task = 200;

    let start = Instant::now();
    let mut handles = Vec::new();

    for _ in 0..n_tasks {
        let host = host.to_string();
        handles.push(tokio::spawn(async move {
            // Each task gets its own tenant (connect() picks a fresh dbname).
            let client = connect(&host, port).await;
            let pid = register_parking(&client).await;

            for j in 0..n_per_task {
                let rid = Ulid::new();
                let s = (j as i64) * HOUR;
                let e = s + HOUR;
                client
                    .batch_execute(&format!(
                        r#"INSERT INTO reservations (id, parking_id, start, "end") VALUES ('{rid}', '{pid}', {s}, {e})"#
                    ))
                    .await
                    .unwrap();
            }
        }));
    }

    for h in handles {
        h.await.unwrap();
    }

    let elapsed = start.elapsed();
    let total = n_tasks * n_per_task;
    let ops = total as f64 / elapsed.as_secs_f64();
    println!(
        "  {n_tasks} tasks x {n_per_task} bookings = {total} total in {:.2}s = {ops:.0} ops/sec",
        elapsed.as_secs_f64()
    );
}

/// Everyone fights over one parking's slots: half the requests land on taken
/// intervals and must come back as conflicts, never as double bookings.
async fn phase3_contended_parking(host: &str, port: u16) {
    let n_tasks = 10;
    let attempts_per_task = 100;

    // All workers share a tenant via a fixed dbname.
    let db = format!("bench_contend_{}", Ulid::new());
    let mut config = Config::new();
    config
        .host(host)
        .port(port)
        .dbname(&db)
        .user("bench")
        .password("valet");
    let (setup, conn) = config.connect(NoTls).await.expect("connect failed");
    tokio::spawn(async move {
        let _ = conn.await;
    });
    let pid = register_parking(&setup).await;

    let conflicts = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let booked = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));

    let start = Instant::now();
    let mut handles = Vec::new();
    for w in 0..n_tasks {
        let host = host.to_string();
        let db = db.clone();
        let conflicts = conflicts.clone();
        let booked = booked.clone();
        handles.push(tokio::spawn(async move {
            let mut config = Config::new();
            config
                .host(&host)
                .port(port)
                .dbname(&db)
                .user(format!("worker{w}"))
                .password("valet");
            let (client, conn) = config.connect(NoTls).await.expect("connect failed");
            tokio::spawn(async move {
                let _ = conn.await;
            });

            for j in 0..attempts_per_task {
                let rid = Ulid::new();
                // Workers collide on the same slot grid.
                let s = (j as i64) * HOUR;
                let e = s + HOUR;
                let result = client
                    .batch_execute(&format!(
                        r#"INSERT INTO reservations (id, parking_id, start, "end") VALUES ('{rid}', '{pid}', {s}, {e})"#
                    ))
                    .await;
                match result {
                    Ok(()) => {
                        booked.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                    }
                    Err(e) if e.code().map(|c| c.code()) == Some("23P01") => {
                        conflicts.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                    }
                    Err(e) => panic!("unexpected error: {e}"),
                }
            }
        }));
    }

    for h in handles {
        h.await.unwrap();
    }

    let elapsed = start.elapsed();
    let ok = booked.load(std::sync::atomic::Ordering::Relaxed);
    let lost = conflicts.load(std::sync::atomic::Ordering::Relaxed);
    println!(
        "  {} attempts on one parking: {ok} booked, {lost} conflicts in {:.2}s",
        n_tasks * attempts_per_task,
        elapsed.as_secs_f64()
    );
    assert_eq!(ok, attempts_per_task, "each slot must be booked exactly once");
}

async fn phase4_availability_reads(host: &str, port: u16) {
    let n_readers = 10;
    let reads_per_reader = 500;

    let mut handles = Vec::new();
    for _ in 0..n_readers {
        let host = host.to_string();
        handles.push(tokio::spawn(async move {
            let client = connect(&host, port).await;
            let pid = register_parking(&client).await;
            for i in 0..50 {
                let rid = Ulid::new();
                let s = (i as i64) * 2 * HOUR;
                let e = s + HOUR;
                client
                    .batch_execute(&format!(
                        r#"INSERT INTO reservations (id, parking_id, start, "end") VALUES ('{rid}', '{pid}', {s}, {e})"#
                    ))
                    .await
                    .unwrap();
            }

            let mut latencies = Vec::with_capacity(reads_per_reader);
            for _ in 0..reads_per_reader {
                let t = Instant::now();
                client
                    .batch_execute(&format!(
                        r#"SELECT * FROM availability WHERE parking_id = '{pid}' AND start >= 0 AND "end" <= 864000000"#
                    ))
                    .await
                    .unwrap();
                latencies.push(t.elapsed());
            }
            latencies
        }));
    }

    let mut all_latencies = Vec::new();
    for h in handles {
        all_latencies.extend(h.await.unwrap());
    }
    print_latency("availability query", &mut all_latencies);
}

#[tokio::main]
async fn main() {
    let host = std::env::var("VALET_HOST").unwrap_or_else(|_| "127.0.0.1".into());
    let port: u16 = std::env::var("VALET_PORT")
        .unwrap_or_else(|_| "5434".into())
        .parse()
        .expect("invalid VALET_PORT");

    println!("=== valet stress benchmark ===");
    println!("target: {host}:{port}\n");

    println!("[phase 1] sequential write throughput");
    phase1_sequential(&host, port).await;

    println!("\n[phase 2] concurrent writes, disjoint tenants");
    phase2_concurrent_disjoint(&host, port).await;

    println!("\n[phase 3] contended parking, conflict correctness");
    phase3_contended_parking(&host, port).await;

    println!("\n[phase 4] availability read latency");
    phase4_availability_reads(&host, port).await;

    println!("\n=== benchmark complete ===");
}
