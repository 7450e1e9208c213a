use std::{
    collections::BTreeMap,
    future::IntoFuture,
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex as StdMutex, MutexGuard,
    },
    time::Duration,
};

use anyhow::{anyhow, Context};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use chrono::{Offset, Utc};
use chrono_tz::Tz;
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use serde::{Deserialize, Serialize};
use tokio::{
    net::TcpListener,
    sync::{mpsc, watch, Mutex},
    time::MissedTickBehavior,
};
use tracing::{debug, error, info, warn};

use grow_common::{
    ControlSet, ControllerStatus, GrowCycleOrchestrator, GrowStatus, IrrigationCycle,
    IrrigationSettings, Photoperiod, RuntimeConfig, SensorDataPayload, SensorKind, SensorReading,
    SensorSettings, SettingsError, SettingsUpdate, TaskId, TOPIC_CMD_GROW_CYCLE,
    TOPIC_CMD_IRRIGATION, TOPIC_CMD_SETTINGS, TOPIC_CONTROLLER_STATUS, TOPIC_LIVE_DATA,
};

use crate::{
    pumps::{DoserModule, Heater, PumpSide, SharedDoser},
    sim::{Actuation, ReservoirSim, Scenario},
    store::{AppStore, FileSettingsStore},
    tasks::{monotonic_ms, GateController, SystemClock, TaskGate, TaskGates},
};

type Orchestrator = GrowCycleOrchestrator<FileSettingsStore, GateController>;
type Snapshot = BTreeMap<SensorKind, f32>;

/// Readings handed from the sync task to the control task.
#[derive(Debug, Clone)]
struct TimedSnapshot {
    taken_ms: u64,
    readings: Snapshot,
}

#[derive(Clone)]
struct AppState {
    grow: Arc<StdMutex<Orchestrator>>,
    grow_status: Arc<watch::Sender<GrowStatus>>,
    controls: Arc<StdMutex<ControlSet>>,
    ph_doser: SharedDoser,
    ec_doser: SharedDoser,
    heater: Arc<StdMutex<Heater>>,
    readings: Arc<Mutex<Snapshot>>,
    reservoir: Arc<Mutex<ReservoirSim>>,
    irrigation: Arc<Mutex<IrrigationCycle>>,
    runtime: Arc<Mutex<RuntimeConfig>>,
    clock: SystemClock,
    time_synced: Arc<AtomicBool>,
    mqtt: AsyncClient,
    store: AppStore,
    fatal: mpsc::UnboundedSender<anyhow::Error>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Serialize)]
struct SettingsUpdateResponse {
    applied: usize,
    #[serde(flatten)]
    grow: GrowStatus,
}

#[derive(Debug, Deserialize)]
struct TimezoneUpdate {
    timezone: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GrowCommand {
    Start,
    Stop,
}

impl GrowCommand {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "start" | "on" => Some(Self::Start),
            "stop" | "off" => Some(Self::Stop),
            _ => None,
        }
    }
}

const MAX_MQTT_PAYLOAD_BYTES: usize = 2048;

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let store = AppStore::new();
    let mut runtime = store.load_runtime_config().await.unwrap_or_else(|err| {
        warn!("failed to load runtime config from store: {err:#}");
        RuntimeConfig::default()
    });
    runtime.controller.sanitize();
    if runtime.timezone.parse::<Tz>().is_err() {
        warn!("unknown timezone {}, photoperiod disabled", runtime.timezone);
    }

    let scenario = Scenario::from_str_lossy(&std::env::var("SIM_SCENARIO").unwrap_or_default());
    info!("simulating reservoir with scenario {scenario}");

    let config = runtime.controller.clone();
    let gates = Arc::new(TaskGates::new());
    let clock = SystemClock::new();
    let ph_doser = SharedDoser::new(DoserModule::ph());
    let ec_doser = SharedDoser::new(DoserModule::ec());

    let (grow, controls) = {
        let settings_path = store.settings_path().to_path_buf();
        let tasks = GateController::new(gates.clone());
        let dosers: Vec<Box<dyn grow_common::DoserActuator + Send>> =
            vec![Box::new(ph_doser.clone()), Box::new(ec_doser.clone())];
        let config = config.clone();
        tokio::task::spawn_blocking(move || -> anyhow::Result<_> {
            let mut controls = ControlSet::new(config.sample_period_ms);
            let mut grow = GrowCycleOrchestrator::new(
                FileSettingsStore::open(settings_path),
                tasks,
                dosers,
                &config,
            );
            grow.init(&mut controls)
                .context("failed to restore grow cycle")?;
            Ok((grow, controls))
        })
        .await
        .context("grow init task failed")??
    };
    let initial_status = grow.status();
    info!(
        "grow cycle restored: settings_received={} grow_active={}",
        initial_status.settings_received, initial_status.grow_active
    );

    let mqtt_host = std::env::var("MQTT_HOST").unwrap_or(runtime.network.mqtt_host.clone());
    let mqtt_port = std::env::var("MQTT_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(runtime.network.mqtt_port);

    let mut mqtt_options =
        MqttOptions::new(runtime.network.device_id.clone(), mqtt_host, mqtt_port);
    let mqtt_user = std::env::var("MQTT_USER").unwrap_or(runtime.network.mqtt_user.clone());
    let mqtt_pass = std::env::var("MQTT_PASS").unwrap_or(runtime.network.mqtt_pass.clone());
    if !mqtt_user.is_empty() {
        mqtt_options.set_credentials(mqtt_user, mqtt_pass);
    }
    mqtt_options.set_keep_alive(Duration::from_secs(30));

    let (mqtt, eventloop) = AsyncClient::new(mqtt_options, 64);
    let (fatal, mut fatal_rx) = mpsc::unbounded_channel();

    let app_state = AppState {
        grow: Arc::new(StdMutex::new(grow)),
        grow_status: Arc::new(watch::Sender::new(initial_status)),
        controls: Arc::new(StdMutex::new(controls)),
        ph_doser,
        ec_doser,
        heater: Arc::new(StdMutex::new(Heater::default())),
        readings: Arc::new(Mutex::new(Snapshot::new())),
        reservoir: Arc::new(Mutex::new(ReservoirSim::new(scenario))),
        irrigation: Arc::new(Mutex::new(IrrigationCycle::new(config.irrigation))),
        runtime: Arc::new(Mutex::new(runtime)),
        clock,
        time_synced: Arc::new(AtomicBool::new(false)),
        mqtt,
        store,
        fatal,
    };

    subscribe_topics(&app_state.mqtt).await?;
    spawn_mqtt_loop(app_state.clone(), eventloop);
    spawn_grow_tasks(&app_state, &gates, &config);

    let app = Router::new()
        .route("/api/status", get(handle_get_status))
        .route("/api/grow/start", post(handle_grow_start))
        .route("/api/grow/stop", post(handle_grow_stop))
        .route("/api/settings", put(handle_put_settings))
        .route(
            "/api/settings/{sensor}",
            get(handle_get_sensor_settings).put(handle_put_sensor_settings),
        )
        .route(
            "/api/irrigation",
            get(handle_get_irrigation).put(handle_put_irrigation),
        )
        .route(
            "/api/photoperiod",
            get(handle_get_photoperiod).put(handle_put_photoperiod),
        )
        .route("/api/timezone", put(handle_put_timezone))
        .with_state(app_state);

    let port = std::env::var("CONTROLLER_HTTP_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind controller server at {addr}"))?;

    info!("controller listening on http://{addr}");
    tokio::select! {
        served = axum::serve(listener, app).into_future() => {
            served.context("controller server failed")?;
        }
        Some(err) = fatal_rx.recv() => {
            error!("shutting down: {err:#}");
            return Err(err);
        }
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted, shutting down");
        }
    }
    Ok(())
}

fn lock<T>(mutex: &StdMutex<T>) -> MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

async fn subscribe_topics(mqtt: &AsyncClient) -> anyhow::Result<()> {
    for topic in [
        TOPIC_CMD_SETTINGS,
        TOPIC_CMD_GROW_CYCLE,
        TOPIC_CMD_IRRIGATION,
    ] {
        mqtt.subscribe(topic, QoS::AtLeastOnce).await?;
    }
    Ok(())
}

fn spawn_mqtt_loop(app_state: AppState, mut eventloop: rumqttc::EventLoop) {
    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::Publish(message))) => {
                    if let Err(err) =
                        handle_mqtt_message(&app_state, message.topic, message.payload.to_vec())
                            .await
                    {
                        warn!("mqtt message handling error: {err:#}");
                    }
                }
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    info!("mqtt connected");
                }
                Ok(_) => {}
                Err(err) => {
                    warn!("mqtt poll error: {err}");
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    });
}

fn every(period_ms: u64) -> tokio::time::Interval {
    let mut interval = tokio::time::interval(Duration::from_millis(period_ms));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

fn spawn_grow_tasks(app_state: &AppState, gates: &TaskGates, config: &grow_common::GrowConfig) {
    let (snapshot_tx, snapshot_rx) = mpsc::channel(4);

    for kind in SensorKind::ALL {
        spawn_sampling_task(
            app_state.clone(),
            kind,
            gates.gate(kind.sampling_task()),
            config.sample_period_ms,
        );
    }
    spawn_sync_task(
        app_state.clone(),
        gates.gate(TaskId::Sync),
        config.sample_period_ms,
        snapshot_tx,
    );
    spawn_control_task(
        app_state.clone(),
        gates.gate(TaskId::ControlEvaluation),
        snapshot_rx,
        config.sample_period_ms,
    );
    spawn_timer_alarm_task(
        app_state.clone(),
        gates.gate(TaskId::TimerAlarm),
        config.timer_alarm_interval_ms,
    );
    spawn_publish_task(
        app_state.clone(),
        gates.gate(TaskId::Publish),
        config.publish_interval_ms,
    );
}

fn spawn_sampling_task(app_state: AppState, kind: SensorKind, mut gate: TaskGate, period_ms: u64) {
    tokio::spawn(async move {
        let mut interval = every(period_ms);
        loop {
            interval.tick().await;
            if !gate.wait_open().await {
                break;
            }
            let (value, actual) = {
                let mut reservoir = app_state.reservoir.lock().await;
                let value = reservoir.sample(kind);
                (value, reservoir.true_value(kind))
            };
            app_state.readings.lock().await.insert(kind, value);
            debug!("{}: sampled {value:.3} (actual {actual:.3})", kind.as_str());
        }
    });
}

fn spawn_sync_task(
    app_state: AppState,
    mut gate: TaskGate,
    period_ms: u64,
    snapshots: mpsc::Sender<TimedSnapshot>,
) {
    tokio::spawn(async move {
        let mut interval = every(period_ms);
        loop {
            interval.tick().await;
            if !gate.wait_open().await {
                break;
            }
            let readings = app_state.readings.lock().await.clone();
            if readings.is_empty() {
                continue;
            }
            let snapshot = TimedSnapshot {
                taken_ms: monotonic_ms(),
                readings,
            };
            if let Err(err) = snapshots.try_send(snapshot) {
                debug!("dropping reading snapshot: {err}");
            }
        }
    });
}

/// A snapshot older than two sample periods was queued before a stop and
/// must not count as a debounce sample.
fn is_fresh(taken_ms: u64, now_ms: u64, period_ms: u64) -> bool {
    now_ms.saturating_sub(taken_ms) <= period_ms.saturating_mul(2)
}

fn spawn_control_task(
    app_state: AppState,
    mut gate: TaskGate,
    mut snapshots: mpsc::Receiver<TimedSnapshot>,
    period_ms: u64,
) {
    tokio::spawn(async move {
        loop {
            if !gate.wait_open().await {
                break;
            }
            let Some(snapshot) = snapshots.recv().await else {
                break;
            };
            if !is_fresh(snapshot.taken_ms, monotonic_ms(), period_ms) {
                debug!("dropping stale reading snapshot");
                continue;
            }
            let actuation = evaluate_controls(&app_state, &snapshot.readings);
            app_state.reservoir.lock().await.set_actuation(actuation);
        }
    });
}

/// One control pass over a snapshot. Runs without awaiting, so the
/// control set is never held across a suspension point.
fn evaluate_controls(app_state: &AppState, snapshot: &Snapshot) -> Actuation {
    let clock = &app_state.clock;
    {
        let mut controls = lock(&app_state.controls);
        for (kind, reading) in snapshot {
            let control = controls.get_mut(*kind);
            match kind {
                SensorKind::WaterTemp => {
                    let decision = control.check(*reading, clock);
                    lock(&app_state.heater).apply(decision);
                }
                SensorKind::Ec | SensorKind::Ph => {
                    let doser = if *kind == SensorKind::Ph {
                        &app_state.ph_doser
                    } else {
                        &app_state.ec_doser
                    };
                    let mut module = doser.lock();
                    module.service(control, clock);
                    let decision = control.check(*reading, clock);
                    if let Some(side) = module.handle(control, decision, *reading, clock) {
                        info!("{}: dosing {side:?} at {reading:.3}", kind.as_str());
                    }
                }
            }
        }
    }
    current_actuation(app_state)
}

fn current_actuation(app_state: &AppState) -> Actuation {
    let running = |doser: &SharedDoser, side: PumpSide| {
        doser
            .lock()
            .pump(side)
            .is_some_and(|pump| pump.is_running())
    };
    Actuation {
        ph_up: running(&app_state.ph_doser, PumpSide::Up),
        ph_down: running(&app_state.ph_doser, PumpSide::Down),
        nutrient: running(&app_state.ec_doser, PumpSide::Up),
        heater: lock(&app_state.heater).is_on(),
    }
}

fn spawn_timer_alarm_task(app_state: AppState, mut gate: TaskGate, period_ms: u64) {
    tokio::spawn(async move {
        let mut interval = every(period_ms);
        let mut last_is_day = None;
        loop {
            interval.tick().await;
            if !gate.wait_open().await {
                break;
            }

            let (timezone, photoperiod) = {
                let runtime = app_state.runtime.lock().await;
                (runtime.timezone.clone(), runtime.controller.photoperiod)
            };
            let now_in_tz = now_in_timezone(&timezone);
            app_state
                .time_synced
                .store(now_in_tz.is_some(), Ordering::Relaxed);

            if let Some(now) = now_in_tz {
                let is_day = photoperiod.is_day(now.time());
                if last_is_day != Some(is_day) {
                    info!("photoperiod: {:?}", photoperiod.phase_at(now.time()));
                    last_is_day = Some(is_day);
                }
                app_state.clock.set_daytime(is_day);
            }

            let now_ms = monotonic_ms();
            let mut irrigation = app_state.irrigation.lock().await;
            if !irrigation.is_running() {
                let on = irrigation.start(now_ms);
                info!("irrigation started, pump {}", if on { "on" } else { "off" });
            } else if let Some(on) = irrigation.tick(now_ms) {
                info!("irrigation pump {}", if on { "on" } else { "off" });
            }
        }
    });
}

fn spawn_publish_task(app_state: AppState, mut gate: TaskGate, period_ms: u64) {
    tokio::spawn(async move {
        let mut interval = every(period_ms);
        loop {
            interval.tick().await;
            if !gate.wait_open().await {
                break;
            }

            let readings = live_readings(&app_state).await;
            let live = SensorDataPayload {
                time: Utc::now().to_rfc3339(),
                sensors: readings,
            };
            publish_json(&app_state, TOPIC_LIVE_DATA, false, &live).await;

            let status = build_status(&app_state).await;
            publish_json(&app_state, TOPIC_CONTROLLER_STATUS, true, &status).await;
        }
    });
}

async fn publish_json<T: Serialize>(app_state: &AppState, topic: &str, retain: bool, value: &T) {
    match serde_json::to_vec(value) {
        Ok(body) => {
            if let Err(err) = app_state
                .mqtt
                .publish(topic, QoS::AtLeastOnce, retain, body)
                .await
            {
                warn!("{topic} publish failed: {err}");
            }
        }
        Err(err) => warn!("{topic} serialization failed: {err}"),
    }
}

async fn live_readings(app_state: &AppState) -> Vec<SensorReading> {
    app_state
        .readings
        .lock()
        .await
        .iter()
        .map(|(kind, value)| SensorReading {
            name: kind.as_str(),
            value: *value,
        })
        .collect()
}

async fn build_status(app_state: &AppState) -> ControllerStatus {
    let readings = live_readings(app_state).await;
    let controls = lock(&app_state.controls).statuses(&app_state.clock);
    let irrigation_on = app_state.irrigation.lock().await.is_pump_on();
    let (timezone, photoperiod) = {
        let runtime = app_state.runtime.lock().await;
        (runtime.timezone.clone(), runtime.controller.photoperiod)
    };
    let next_photoperiod_epoch = now_in_timezone(&timezone)
        .and_then(|now| photoperiod.next_transition(now))
        .map(|(at, _)| at.timestamp());

    ControllerStatus {
        grow: *app_state.grow_status.borrow(),
        is_day: grow_common::ControlClock::is_daytime(&app_state.clock),
        irrigation_on,
        next_photoperiod_epoch,
        timezone,
        readings,
        controls,
    }
}

/// Runs a grow transition on the blocking pool. A persistence failure is
/// fatal: the process exits so it restarts from the last durable state.
async fn run_grow_command(app_state: &AppState, command: GrowCommand) -> anyhow::Result<bool> {
    let grow = app_state.grow.clone();
    let (result, status) = tokio::task::spawn_blocking(move || {
        let mut grow = lock(&grow);
        let result = match command {
            GrowCommand::Start => grow.start_grow_cycle(),
            GrowCommand::Stop => grow.stop_grow_cycle().map(|()| true),
        };
        (result, grow.status())
    })
    .await
    .context("grow transition task failed")?;

    app_state.grow_status.send_replace(status);
    if command == GrowCommand::Stop {
        park_host_actuators(app_state).await;
        log_pump_totals(app_state);
    }

    match result {
        Ok(done) => Ok(done),
        Err(err) => {
            error!("grow {command:?} could not be persisted: {err}");
            let fatal = anyhow!("grow transition {command:?} failed: {err}");
            if app_state.fatal.send(fatal).is_err() {
                warn!("fatal channel closed");
            }
            Err(err.into())
        }
    }
}

fn log_pump_totals(app_state: &AppState) {
    for doser in [&app_state.ph_doser, &app_state.ec_doser] {
        let module = doser.lock();
        for side in [PumpSide::Up, PumpSide::Down] {
            if let Some(pump) = module.pump(side) {
                info!(
                    "{}: {} doses, hibernating={}",
                    pump.name(),
                    pump.doses(),
                    pump.is_hibernating()
                );
            }
        }
    }
}

/// Actuators outside the orchestrator's doser set, switched off once the
/// tasks driving them are suspended.
async fn park_host_actuators(app_state: &AppState) {
    lock(&app_state.heater).off();
    app_state.irrigation.lock().await.stop();
    let actuation = current_actuation(app_state);
    app_state.reservoir.lock().await.set_actuation(actuation);
}

async fn apply_settings_update(
    app_state: &AppState,
    update: SettingsUpdate,
) -> Result<usize, SettingsError> {
    let grow = app_state.grow.clone();
    let controls = app_state.controls.clone();
    let joined = tokio::task::spawn_blocking(move || {
        let mut grow = lock(&grow);
        let mut controls = lock(&controls);
        let applied = grow.apply_settings_update(&mut controls, &update);
        (applied, grow.status())
    })
    .await;

    match joined {
        Ok((applied, status)) => {
            app_state.grow_status.send_replace(status);
            applied
        }
        Err(err) => {
            error!("settings task failed: {err}");
            Err(SettingsError::Store(grow_common::StoreError::Io(err.to_string())))
        }
    }
}

async fn handle_mqtt_message(
    app_state: &AppState,
    topic: String,
    payload: Vec<u8>,
) -> anyhow::Result<()> {
    if payload.len() > MAX_MQTT_PAYLOAD_BYTES {
        warn!(
            "dropping oversized MQTT payload on topic {} ({} bytes)",
            topic,
            payload.len()
        );
        return Ok(());
    }

    let message = String::from_utf8(payload).context("non utf8 mqtt payload")?;

    match topic.as_str() {
        TOPIC_CMD_SETTINGS => {
            let update: SettingsUpdate =
                serde_json::from_str(&message).context("invalid settings payload")?;
            let applied = apply_settings_update(app_state, update).await?;
            info!("applied {applied} sensor settings from mqtt");
        }
        TOPIC_CMD_GROW_CYCLE => {
            let Some(command) = GrowCommand::parse(&message) else {
                warn!("unknown grow cycle command {message:?}");
                return Ok(());
            };
            if !run_grow_command(app_state, command).await? {
                warn!("grow cycle start refused until settings are received");
            }
        }
        TOPIC_CMD_IRRIGATION => {
            let settings: IrrigationSettings =
                serde_json::from_str(&message).context("invalid irrigation payload")?;
            update_irrigation(app_state, settings).await?;
        }
        _ => {}
    }
    Ok(())
}

async fn update_irrigation(
    app_state: &AppState,
    settings: IrrigationSettings,
) -> anyhow::Result<()> {
    app_state
        .irrigation
        .lock()
        .await
        .update_timings(settings, monotonic_ms());
    app_state.runtime.lock().await.controller.irrigation = settings;
    persist_runtime_from_state(app_state).await
}

async fn persist_runtime_from_state(app_state: &AppState) -> anyhow::Result<()> {
    let runtime = app_state.runtime.lock().await.clone();
    app_state.store.save_runtime_config(&runtime).await
}

async fn handle_get_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(build_status(&state).await)
}

async fn handle_grow_start(State(state): State<AppState>) -> impl IntoResponse {
    match run_grow_command(&state, GrowCommand::Start).await {
        Ok(true) => Json(*state.grow_status.borrow()).into_response(),
        Ok(false) => error_response(
            StatusCode::CONFLICT,
            "Settings have not been received yet",
        ),
        Err(err) => {
            warn!("grow start failed: {err:#}");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to persist grow state",
            )
        }
    }
}

async fn handle_grow_stop(State(state): State<AppState>) -> impl IntoResponse {
    match run_grow_command(&state, GrowCommand::Stop).await {
        Ok(_) => Json(*state.grow_status.borrow()).into_response(),
        Err(err) => {
            warn!("grow stop failed: {err:#}");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to persist grow state",
            )
        }
    }
}

fn settings_error_response(err: &SettingsError) -> axum::response::Response {
    match err {
        SettingsError::Invalid { .. } => error_response(StatusCode::BAD_REQUEST, &err.to_string()),
        SettingsError::Store(_) => {
            warn!("failed to persist settings: {err:#}");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to persist sensor settings",
            )
        }
    }
}

async fn handle_put_settings(
    State(state): State<AppState>,
    Json(update): Json<SettingsUpdate>,
) -> impl IntoResponse {
    if update.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "No sensor settings in update");
    }
    match apply_settings_update(&state, update).await {
        Ok(applied) => Json(SettingsUpdateResponse {
            applied,
            grow: *state.grow_status.borrow(),
        })
        .into_response(),
        Err(err) => settings_error_response(&err),
    }
}

async fn handle_get_sensor_settings(
    State(state): State<AppState>,
    Path(sensor): Path<String>,
) -> impl IntoResponse {
    let Some(kind) = SensorKind::parse(&sensor) else {
        return error_response(StatusCode::NOT_FOUND, "Unknown sensor");
    };
    let grow = state.grow.clone();
    let stored = tokio::task::spawn_blocking(move || {
        grow_common::SettingsStore::load_sensor_settings(lock(&grow).store(), kind)
    })
    .await;

    match stored {
        Ok(settings) => {
            Json(settings.unwrap_or_else(|| SensorSettings::default_for(kind))).into_response()
        }
        Err(err) => {
            warn!("failed to load {} settings: {err}", kind.as_str());
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to load sensor settings",
            )
        }
    }
}

async fn handle_put_sensor_settings(
    State(state): State<AppState>,
    Path(sensor): Path<String>,
    Json(settings): Json<SensorSettings>,
) -> impl IntoResponse {
    let Some(kind) = SensorKind::parse(&sensor) else {
        return error_response(StatusCode::NOT_FOUND, "Unknown sensor");
    };
    let mut update = SettingsUpdate::default();
    match kind {
        SensorKind::WaterTemp => update.water_temp = Some(settings.clone()),
        SensorKind::Ec => update.ec = Some(settings.clone()),
        SensorKind::Ph => update.ph = Some(settings.clone()),
    }

    match apply_settings_update(&state, update).await {
        Ok(_) => Json(settings).into_response(),
        Err(err) => settings_error_response(&err),
    }
}

async fn handle_get_irrigation(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.runtime.lock().await.controller.irrigation)
}

async fn handle_put_irrigation(
    State(state): State<AppState>,
    Json(settings): Json<IrrigationSettings>,
) -> impl IntoResponse {
    if let Err(err) = update_irrigation(&state, settings).await {
        warn!("failed to persist irrigation update: {err:#}");
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to persist runtime settings",
        );
    }
    handle_get_irrigation(State(state)).await.into_response()
}

async fn handle_get_photoperiod(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.runtime.lock().await.controller.photoperiod)
}

async fn handle_put_photoperiod(
    State(state): State<AppState>,
    Json(photoperiod): Json<Photoperiod>,
) -> impl IntoResponse {
    if !photoperiod.day_start.validate() || !photoperiod.night_start.validate() {
        return error_response(StatusCode::BAD_REQUEST, "Invalid alarm time");
    }
    state.runtime.lock().await.controller.photoperiod = photoperiod;
    if let Err(err) = persist_runtime_from_state(&state).await {
        warn!("failed to persist photoperiod update: {err:#}");
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to persist runtime settings",
        );
    }
    handle_get_photoperiod(State(state)).await.into_response()
}

async fn handle_put_timezone(
    State(state): State<AppState>,
    Json(update): Json<TimezoneUpdate>,
) -> impl IntoResponse {
    if update.timezone.parse::<Tz>().is_err() {
        return error_response(StatusCode::BAD_REQUEST, "Invalid timezone value");
    }
    state.runtime.lock().await.timezone = update.timezone;
    if let Err(err) = persist_runtime_from_state(&state).await {
        warn!("failed to persist timezone update: {err:#}");
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to persist runtime settings",
        );
    }
    handle_get_status(State(state)).await.into_response()
}

fn now_in_timezone(timezone: &str) -> Option<chrono::DateTime<chrono::FixedOffset>> {
    let tz: Tz = timezone.parse().ok()?;
    let local = Utc::now().with_timezone(&tz);
    Some(local.with_timezone(&local.offset().fix()))
}

fn error_response(status: StatusCode, message: &str) -> axum::response::Response {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
}
