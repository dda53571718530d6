//! Simple publisher example
//!
//! This example demonstrates a slot worker publishing journal records and the
//! driver's status report.
//!
//! **NOTE:** This runs against the in-memory broker from
//! `rabbitmq_driver::testing`. A deployment implements `BrokerClient` over an
//! AMQP client library and hands that to `RabbitMqDriver::new` instead.
//!
//! Usage:
//!   AMQP_HOSTNAME=mq1,mq2 \
//!   RUST_LOG=debug \
//!   cargo run --example simple_publisher

use rabbitmq_driver::testing::MemoryBroker;
use rabbitmq_driver::{
    DriverConfig, DriverResult, DriverSettings, RabbitMqDriver, RetrySettings, SlotWorker,
};

const CHECK_UUID: &str = "550e8400-e29b-41d4-a716-446655440000";

fn main() -> DriverResult<()> {
    let broker = MemoryBroker::new();
    let driver = RabbitMqDriver::new(broker.clone(), DriverSettings::default());

    let mut config = DriverConfig {
        exchange: "noit.firehose".to_string(),
        routingkey: "check".to_string(),
        username: "guest".to_string(),
        password: "guest".to_string(),
        hostname: "mq1,mq2".to_string(),
        ..DriverConfig::default()
    };
    config.apply_env_overrides();

    let worker = SlotWorker::spawn(&driver, &config, &RetrySettings::default(), 64)?;
    println!("Started worker {}", worker.owner());

    for i in 0..5 {
        let record = format!(
            "M\t192.0.2.1\t{}.000\texample.com`http`c_42_{}::http`{}\tduration\tI\t{}",
            1_700_000_000 + i,
            1000 + i,
            CHECK_UUID,
            i * 10
        );
        worker.blocking_send(record.into_bytes())?;
    }

    // Status while the worker still holds its slot
    println!("{}", driver.status());

    let report = worker.shutdown()?;
    println!(
        "Worker finished: {} delivered, {} dropped, {} retries",
        report.delivered, report.dropped, report.retries
    );

    for message in broker.published() {
        println!("{} -> {}", message.exchange, message.routing_key);
    }

    Ok(())
}
