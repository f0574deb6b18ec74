use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use log::{error, info};
use tokio::signal;
use tokio::time::{Instant, sleep, sleep_until};

use matter_im_reporting::config::{Config, load_dotenv};
use matter_im_reporting::error::{ImError, Result};
use matter_im_reporting::matter::client::{
    CachedCallback, ClientRegistry, ReadClientCallback, ReadPrepareParams,
};
use matter_im_reporting::matter::clusters::{
    self, CONTACT_SENSOR_ENDPOINT, SWITCH_ENDPOINT, TEMPERATURE_SENSOR_ENDPOINT, boolean_state,
    generic_switch, temperature_measurement,
};
use matter_im_reporting::matter::codec::JsonCodec;
use matter_im_reporting::matter::data_model::MemoryDataModel;
use matter_im_reporting::matter::events::{
    ConcreteEventPath, EventDataIB, EventPathParams, EventPriority, EventTimestamp,
};
use matter_im_reporting::matter::ids::{ScopedNodeId, SubscriptionId};
use matter_im_reporting::matter::loopback::LoopbackLink;
use matter_im_reporting::matter::path::{AttributePathParams, ConcreteAttributePath, ConcreteDataAttributePath};
use matter_im_reporting::matter::reporting::Engine;
use matter_im_reporting::matter::status::Status;
use matter_im_reporting::matter::subscription_persistence::SubscriptionStore;
use matter_im_reporting::matter::value::Value;

/// Simulated bridge device with a subscribing controller, both in process.
#[derive(Parser, Debug)]
#[command(name = "matter-im-reporting", version, about)]
struct Cli {
    /// Seconds between simulated sensor changes
    #[arg(long, env = "DEMO_TICK_SECS", default_value_t = 5)]
    tick_secs: u64,

    /// Min interval floor requested by the controller
    #[arg(long, env = "DEMO_MIN_INTERVAL", default_value_t = 1)]
    min_interval: u16,

    /// Max interval ceiling requested by the controller
    #[arg(long, env = "DEMO_MAX_INTERVAL", default_value_t = 30)]
    max_interval: u16,

    /// Do not persist subscriptions across restarts
    #[arg(long)]
    no_persistence: bool,
}

fn init_logger() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}

/// Logs what the controller sees.
#[derive(Default)]
struct ControllerLog;

impl ReadClientCallback for ControllerLog {
    fn on_attribute_data(
        &mut self,
        path: &ConcreteDataAttributePath,
        data: std::result::Result<&Value, Status>,
    ) {
        match data {
            Ok(value) => info!("[Controller] {} = {:?}", path.path, value),
            Err(status) => info!("[Controller] {} -> {}", path.path, status),
        }
    }

    fn on_event_data(&mut self, event: &EventDataIB) {
        info!(
            "[Controller] event #{} on {:?}: {:?}",
            event.event_number(),
            event.header.path,
            event.data
        );
    }

    fn on_error(&mut self, error: &ImError) {
        error!("[Controller] {}", error);
    }

    fn on_done(&mut self) {
        info!("[Controller] done");
    }

    fn on_subscription_established(&mut self, subscription_id: SubscriptionId) {
        info!("[Controller] subscription 0x{:08x} established", subscription_id);
    }

    fn on_resubscription_scheduled(&mut self, attempt: u32, wait: Duration) {
        info!("[Controller] resubscribe attempt {} in {:?}", attempt, wait);
    }
}

/// Sensor state driven by the demo ticker.
struct Simulation {
    contact: bool,
    temperature: i16,
    ticks: u64,
}

impl Simulation {
    fn step(&mut self, engine: &mut Engine<MemoryDataModel>, now: Duration) {
        self.ticks += 1;

        self.contact = !self.contact;
        let contact = ConcreteAttributePath::new(
            CONTACT_SENSOR_ENDPOINT,
            boolean_state::CLUSTER_ID,
            boolean_state::BooleanStateAttribute::StateValue as u32,
        );
        update(engine, contact, self.contact.into(), now);
        engine.log_event(
            ConcreteEventPath::new(
                CONTACT_SENSOR_ENDPOINT,
                boolean_state::CLUSTER_ID,
                boolean_state::events::STATE_CHANGE,
            ),
            EventPriority::Info,
            EventTimestamp::epoch_now(),
            boolean_state::state_change(self.contact),
            now,
        );

        self.temperature = (self.temperature + rand::random::<i16>() % 25).clamp(-4000, 8500);
        let temperature = ConcreteAttributePath::new(
            TEMPERATURE_SENSOR_ENDPOINT,
            temperature_measurement::CLUSTER_ID,
            temperature_measurement::TemperatureMeasurementAttribute::MeasuredValue as u32,
        );
        update(engine, temperature, self.temperature.into(), now);

        if self.ticks % 3 == 0 {
            info!("Simulating switch press");
            engine.log_event(
                ConcreteEventPath::new(
                    SWITCH_ENDPOINT,
                    generic_switch::CLUSTER_ID,
                    generic_switch::events::INITIAL_PRESS,
                ),
                EventPriority::Info,
                EventTimestamp::epoch_now(),
                generic_switch::initial_press(1),
                now,
            );
        }
    }
}

fn update(engine: &mut Engine<MemoryDataModel>, path: ConcreteAttributePath, value: Value, now: Duration) {
    match engine.data_model_mut().set_attribute(path, value) {
        Ok(true) => engine.set_dirty(path.into(), now),
        Ok(false) => {}
        Err(status) => error!("Failed to update {}: {}", path, status),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    load_dotenv();
    init_logger();
    let cli = Cli::parse();
    let config = Config::from_env();
    info!("Starting Matter IM reporting demo");
    info!("  Max message size: {} bytes", config.engine.max_message_size);
    info!(
        "  Subscriptions: {} (reports in flight: {})",
        config.engine.max_subscriptions, config.engine.max_reports_in_flight
    );

    let start = Instant::now();
    let now = || start.elapsed();

    let data_model = clusters::bridge_data_model(config.icd.idle_mode_duration_secs);
    let mut engine = Engine::new(&config, data_model, Box::new(JsonCodec));
    if !cli.no_persistence
        && let Some(path) = &config.persistence.subscriptions_file
    {
        let store = Arc::new(SubscriptionStore::new(path.clone()));
        engine = engine.with_subscription_store(store, now());
    }

    let server_node = ScopedNodeId::new(0x0000_0000_0000_1001, 1);
    let controller_node = ScopedNodeId::new(0x0000_0000_0001_B669, 1);
    let mut link = LoopbackLink::new(server_node, controller_node);
    let mut clients: ClientRegistry<CachedCallback<ControllerLog>> =
        ClientRegistry::new(&config.client, Box::new(JsonCodec));

    let params = ReadPrepareParams::new(link.client_session)
        .attributes([AttributePathParams::wildcard()])
        .events([
            EventPathParams::wildcard(),
            EventPathParams::cluster(SWITCH_ENDPOINT, generic_switch::CLUSTER_ID).urgent(),
        ])
        .intervals(cli.min_interval, cli.max_interval);
    let subscription = clients.subscribe(&mut link.client, params, CachedCallback::new(ControllerLog))?;

    let mut simulation = Simulation {
        contact: false,
        temperature: 2150,
        ticks: 0,
    };
    let mut ticker = tokio::time::interval(Duration::from_secs(cli.tick_secs.max(1)));
    let ctrl_c = signal::ctrl_c();
    tokio::pin!(ctrl_c);

    info!("Demo running, press Ctrl+C to exit");
    loop {
        link.pump(&mut engine, &mut clients, now());

        let deadline = [engine.next_deadline(), clients.next_deadline()]
            .into_iter()
            .flatten()
            .min();
        let wake = async {
            match deadline {
                Some(deadline) => sleep_until(start + deadline).await,
                None => sleep(Duration::from_secs(3600)).await,
            }
        };

        tokio::select! {
            result = &mut ctrl_c => {
                if let Err(e) = result {
                    error!("Failed to listen for shutdown signal: {}", e);
                }
                info!("Received shutdown signal");
                break;
            }
            _ = wake => {
                engine.on_timer(&mut link.server, now());
                clients.on_timer(&mut link.client, now());
            }
            _ = ticker.tick() => simulation.step(&mut engine, now()),
        }
        clients.remove_terminated();
    }

    if let Some(callback) = clients.shutdown(&mut link.client, subscription) {
        info!(
            "Controller cached {} attribute(s) and {} event(s)",
            callback.cache.attribute_count(),
            callback.cache.event_count()
        );
    }
    info!("Shutdown complete");
    Ok(())
}
