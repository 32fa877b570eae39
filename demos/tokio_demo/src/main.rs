use env_logger::Env;
use log::{info, warn};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{sleep, Duration};

use rs_observable_cell::{
    Delivery, DeliveryError, FailureSink, ObservableCell, Presence, Subscriber,
};

#[derive(Debug, Clone, PartialEq)]
struct Reading {
    sensor: String,
    celsius: i32,
}

#[tokio::main]
async fn main() {
    let env = Env::default().filter_or("LOG_LEVEL", "info");
    env_logger::init_from_env(env);

    info!("tokio demo started");

    let sink: Arc<dyn FailureSink> = Arc::new(|e: &DeliveryError| warn!("demo sink: {}", e));
    let temperature = ObservableCell::builder(0)
        .presence(Presence::Strict)
        .sink(sink)
        .build();

    let (tx, mut rx) = mpsc::unbounded_channel::<i32>();
    let printer = Subscriber::from_fn(move |d: Delivery<i32>| {
        if let Some(v) = d.into_value() {
            let _ = tx.send(v);
        }
    });
    let disposer = temperature.connect_with(&printer, || info!("printer disconnected"));

    let flaky = Subscriber::<i32>::new(|d| match d.value() {
        Some(v) if *v < 0 => Err(format!("below zero: {}", v).into()),
        _ => Ok(()),
    });
    temperature.connect(&flaky);

    let writer = temperature.clone();
    tokio::spawn(async move {
        for v in [21, 21, 23, -4, 0] {
            sleep(Duration::from_millis(100)).await;
            let notified = writer.set(v);
            info!("set {} -> notified={}", v, notified);
        }
    });

    // 21 is sent twice but only announced once
    for _ in 0..4 {
        match rx.recv().await {
            Some(v) => info!("printer received {}", v),
            None => break,
        }
    }
    disposer.dispose();
    info!("final value: {}", temperature);

    let readings = ObservableCell::with_unpack(Vec::<Reading>::new(), true);
    let (rtx, mut rrx) = mpsc::unbounded_channel::<String>();
    readings.connect(&Subscriber::from_fn(move |d: Delivery<Vec<Reading>>| {
        if let Some(elements) = d.elements() {
            let line = elements
                .iter()
                .map(|r| format!("{}={}", r.sensor, r.celsius))
                .collect::<Vec<_>>()
                .join(", ");
            let _ = rtx.send(line);
        }
    }));
    readings.set(vec![
        Reading {
            sensor: "north".to_string(),
            celsius: 19,
        },
        Reading {
            sensor: "south".to_string(),
            celsius: 24,
        },
    ]);
    if let Some(line) = rrx.recv().await {
        info!("readings cell spread: {}", line);
    }
}
