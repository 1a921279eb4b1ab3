//! Example demonstrating offline batch encoding.
//!
//! This example shows how to:
//! - Define channel-rate measurements over a log store
//! - Derive the CSV schema from the measurement set
//! - Encode interval ticks into a batch, exactly as the uploader would

use wattpost::encoder::{Batch, RowEncoder};
use wattpost::log::{LogStore, MemoryLog, Snapshot};
use wattpost::measurement::{ChannelRate, Measurement, Unit, sort_measurements};

fn main() {
    println!("🚀 wattpost offline encoding example");

    // Two sensors: the mains feed reports Watts and Volts, solar only Watts.
    let mut measurements: Vec<Box<dyn Measurement>> = vec![
        Box::new(ChannelRate {
            name: "main".to_string(),
            unit: Unit::Watts,
            channel: 0,
            precision: 1,
        }),
        Box::new(ChannelRate {
            name: "main".to_string(),
            unit: Unit::Volts,
            channel: 1,
            precision: 1,
        }),
        Box::new(ChannelRate {
            name: "solar".to_string(),
            unit: Unit::Watts,
            channel: 2,
            precision: 1,
        }),
    ];
    sort_measurements(&mut measurements);

    // Five minutes of log records: ~1.2 kW mains draw, 240 V, 800 W solar.
    // Channels accumulate watt-hours (volt-hours for the voltage channel).
    println!("\n📊 Building a five-minute log...");
    let mut log = MemoryLog::new();
    let start = 1_700_000_000u32 - 1_700_000_000 % 60;
    for i in 0..6u32 {
        let hours = f64::from(i) / 60.0;
        log.push(Snapshot {
            time: start + i * 60,
            log_hours: hours,
            channels: vec![1200.0 * hours, 240.0 * hours, 800.0 * hours],
        });
    }

    let encoder = RowEncoder::new(&measurements, "iw42".to_string());
    println!("Header: {}", encoder.header());

    // Encode every complete interval, the same walk the uploader performs.
    let mut batch = Batch::new(4096);
    let mut older = log.read_at(start);
    for i in 1..6u32 {
        let newer = log.read_at(start + i * 60);
        encoder.encode_tick(&measurements, &older, &newer, &mut batch);
        older = newer;
    }

    println!(
        "\n📦 Batch: {} rows, {} bytes",
        batch.row_count(),
        batch.len()
    );
    println!("\n{}", batch.take_body());
}
