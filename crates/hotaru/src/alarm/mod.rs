//! Alarm state machine
//!
//! The alarm is either `Idle` or `Active`. While active, the actuator is
//! pulsed on and off every `pulse_interval` by a background tick. Arming and
//! disarming are edge-triggered: repeating a command in the same state
//! changes nothing and does not count as a new alert.
//!
//! Lock order is alarm, then telemetry. The telemetry mirror
//! (`alarm_active`, `total_alerts`) is written while the alarm lock is held.

pub mod actuator;

pub use actuator::{Actuator, ActuatorBank, LogActuator, SysfsGpio};

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::motion::MotionSample;
use crate::telemetry::{SharedTelemetry, Telemetry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmState {
    Idle,
    Active,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlarmSnapshot {
    pub state: AlarmState,
    pub actuator_on: bool,
    pub activated_at: Option<Instant>,
}

#[derive(Debug, Clone)]
pub struct AlarmConfig {
    /// Time between actuator toggles while active
    pub pulse_interval: Duration,
    /// How often the background loop checks for a due toggle
    pub tick_period: Duration,
    /// Whether a triggering motion sample arms the alarm
    pub trigger_on_motion: bool,
}

impl Default for AlarmConfig {
    fn default() -> Self {
        Self {
            pulse_interval: Duration::from_millis(400),
            tick_period: Duration::from_millis(50),
            trigger_on_motion: true,
        }
    }
}

/// Remote alarm command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmCommand {
    Arm,
    Disarm,
}

impl AlarmCommand {
    /// Returns `None` for commands this device does not know.
    pub fn parse(command: &str) -> Option<Self> {
        match command {
            "ALARM_ON" => Some(AlarmCommand::Arm),
            "ALARM_OFF" => Some(AlarmCommand::Disarm),
            _ => None,
        }
    }
}

struct Inner {
    state: AlarmState,
    activated_at: Option<Instant>,
    actuator_on: bool,
    last_toggle: Option<Instant>,
}

#[derive(Clone)]
pub struct AlarmController {
    inner: Arc<Mutex<Inner>>,
    actuator: Arc<dyn Actuator>,
    telemetry: SharedTelemetry,
    config: AlarmConfig,
}

impl AlarmController {
    pub fn new(
        config: AlarmConfig,
        actuator: Arc<dyn Actuator>,
        telemetry: SharedTelemetry,
    ) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                state: AlarmState::Idle,
                activated_at: None,
                actuator_on: false,
                last_toggle: None,
            })),
            actuator,
            telemetry,
            config,
        }
    }

    pub fn config(&self) -> &AlarmConfig {
        &self.config
    }

    /// Idle to Active. Returns true if this call changed the state.
    pub fn arm(&self, now: Instant) -> bool {
        let mut inner = self.inner.lock();
        self.arm_locked(&mut inner, now, |_| {})
    }

    /// Active to Idle. Returns true if this call changed the state.
    pub fn disarm(&self) -> bool {
        let mut inner = self.inner.lock();
        self.disarm_locked(&mut inner, |_| {})
    }

    /// Set the alarm from a remote command, recording its status string.
    ///
    /// The alarm mirror and the command status land in one telemetry update.
    pub fn force_set(&self, active: bool, status: Option<&str>) -> bool {
        let now_ms = self.telemetry.now_ms();
        let record = |t: &mut Telemetry| {
            if let Some(status) = status {
                t.detection_status = status.to_string();
            }
            t.last_detection_ms = now_ms;
        };

        let mut inner = self.inner.lock();
        if active {
            self.arm_locked(&mut inner, Instant::now(), record)
        } else {
            self.disarm_locked(&mut inner, record)
        }
    }

    /// Arm on a triggering sample, if motion is linked to the alarm.
    pub fn on_motion(&self, sample: &MotionSample, now: Instant) -> bool {
        if !sample.triggered || !self.config.trigger_on_motion {
            return false;
        }
        self.arm(now)
    }

    /// Toggle the actuator if a pulse is due. At most one toggle per call.
    pub fn tick(&self, now: Instant) -> bool {
        let mut inner = self.inner.lock();
        if inner.state != AlarmState::Active {
            return false;
        }
        let due = match inner.last_toggle {
            Some(last) => now.saturating_duration_since(last) >= self.config.pulse_interval,
            None => true,
        };
        if !due {
            return false;
        }

        inner.actuator_on = !inner.actuator_on;
        inner.last_toggle = Some(now);
        self.drive(inner.actuator_on);
        true
    }

    pub fn snapshot(&self) -> AlarmSnapshot {
        let inner = self.inner.lock();
        AlarmSnapshot {
            state: inner.state,
            actuator_on: inner.actuator_on,
            activated_at: inner.activated_at,
        }
    }

    pub fn is_active(&self) -> bool {
        self.inner.lock().state == AlarmState::Active
    }

    fn arm_locked(
        &self,
        inner: &mut Inner,
        now: Instant,
        record: impl FnOnce(&mut Telemetry),
    ) -> bool {
        let changed = inner.state != AlarmState::Active;
        if changed {
            inner.state = AlarmState::Active;
            inner.activated_at = Some(now);
            inner.actuator_on = true;
            inner.last_toggle = Some(now);
            self.drive(true);
        }
        self.telemetry.update(|t| {
            if changed {
                t.alarm_active = true;
                t.total_alerts += 1;
            }
            record(t);
        });
        if changed {
            info!("Alarm armed");
        }
        changed
    }

    fn disarm_locked(&self, inner: &mut Inner, record: impl FnOnce(&mut Telemetry)) -> bool {
        let was_active = inner.state == AlarmState::Active;
        inner.state = AlarmState::Idle;
        inner.activated_at = None;
        inner.actuator_on = false;
        inner.last_toggle = None;
        self.drive(false);
        self.telemetry.update(|t| {
            t.alarm_active = false;
            record(t);
        });
        if was_active {
            info!("Alarm disarmed");
        }
        was_active
    }

    /// Drive the output low and record it, leaving the alarm state as is.
    fn silence(&self) {
        let mut inner = self.inner.lock();
        if inner.actuator_on {
            inner.actuator_on = false;
            inner.last_toggle = None;
            self.drive(false);
        }
    }

    fn drive(&self, on: bool) {
        if let Err(e) = self.actuator.drive(on) {
            warn!(actuator = self.actuator.name(), "Actuator write failed: {:#}", e);
        }
    }
}

/// Run the pulse tick until `cancel` fires. The output is left low.
pub fn spawn_pulse_loop(alarm: AlarmController, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(alarm.config.tick_period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    if alarm.tick(Instant::now()) {
                        debug!(on = alarm.snapshot().actuator_on, "Alarm pulse");
                    }
                }
            }
        }

        alarm.silence();
        debug!("Alarm pulse loop stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Default)]
    struct RecordingActuator {
        writes: Mutex<Vec<bool>>,
        failures: AtomicU32,
        fail: bool,
    }

    impl Actuator for RecordingActuator {
        fn drive(&self, on: bool) -> anyhow::Result<()> {
            self.writes.lock().push(on);
            if self.fail {
                self.failures.fetch_add(1, Ordering::SeqCst);
                anyhow::bail!("pin stuck");
            }
            Ok(())
        }

        fn name(&self) -> &str {
            "recording"
        }
    }

    fn controller() -> (AlarmController, Arc<RecordingActuator>, SharedTelemetry) {
        let actuator = Arc::new(RecordingActuator::default());
        let telemetry = SharedTelemetry::new(true);
        let alarm = AlarmController::new(AlarmConfig::default(), actuator.clone(), telemetry.clone());
        (alarm, actuator, telemetry)
    }

    fn triggered() -> MotionSample {
        MotionSample {
            changed_fraction: 0.5,
            triggered: true,
        }
    }

    #[test]
    fn arming_counts_one_alert_per_edge() {
        let (alarm, actuator, telemetry) = controller();

        assert!(alarm.force_set(true, Some("intruder")));
        assert!(!alarm.force_set(true, Some("intruder")));

        let t = telemetry.read();
        assert_eq!(t.total_alerts, 1);
        assert!(t.alarm_active);
        assert_eq!(t.detection_status, "intruder");
        assert!(t.last_detection_ms >= 1);

        let snap = alarm.snapshot();
        assert_eq!(snap.state, AlarmState::Active);
        assert!(snap.actuator_on);
        assert!(snap.activated_at.is_some());
        assert_eq!(actuator.writes.lock().as_slice(), &[true]);
    }

    #[test]
    fn disarm_always_turns_output_off() {
        let (alarm, actuator, telemetry) = controller();
        let start = Instant::now();
        alarm.arm(start);
        alarm.tick(start + Duration::from_millis(400));
        alarm.tick(start + Duration::from_millis(800));
        assert!(alarm.snapshot().actuator_on);

        assert!(alarm.force_set(false, None));
        let snap = alarm.snapshot();
        assert_eq!(snap.state, AlarmState::Idle);
        assert!(!snap.actuator_on);
        assert_eq!(snap.activated_at, None);
        assert!(!telemetry.read().alarm_active);
        assert_eq!(actuator.writes.lock().last(), Some(&false));

        // Disarming when idle is not an edge
        assert!(!alarm.disarm());
    }

    #[test]
    fn tick_toggles_once_per_interval() {
        let (alarm, _, _) = controller();
        let start = Instant::now();
        alarm.arm(start);

        // Not yet due
        assert!(!alarm.tick(start + Duration::from_millis(399)));
        assert!(alarm.snapshot().actuator_on);

        let due = start + Duration::from_millis(400);
        assert!(alarm.tick(due));
        assert!(!alarm.snapshot().actuator_on);

        // Zero elapsed since the toggle
        assert!(!alarm.tick(due));
        assert!(!alarm.snapshot().actuator_on);

        // A long gap still toggles only once
        assert!(alarm.tick(due + Duration::from_secs(10)));
        assert!(alarm.snapshot().actuator_on);
    }

    #[test]
    fn tick_is_a_no_op_when_idle() {
        let (alarm, actuator, _) = controller();
        assert!(!alarm.tick(Instant::now() + Duration::from_secs(5)));
        assert!(actuator.writes.lock().is_empty());
    }

    #[test]
    fn motion_arms_when_linked() {
        let (alarm, _, telemetry) = controller();
        let quiet = MotionSample::baseline();
        assert!(!alarm.on_motion(&quiet, Instant::now()));
        assert!(alarm.on_motion(&triggered(), Instant::now()));
        assert!(!alarm.on_motion(&triggered(), Instant::now()));
        assert_eq!(telemetry.read().total_alerts, 1);
    }

    #[test]
    fn motion_ignored_when_unlinked() {
        let telemetry = SharedTelemetry::new(true);
        let config = AlarmConfig {
            trigger_on_motion: false,
            ..Default::default()
        };
        let alarm = AlarmController::new(config, Arc::new(LogActuator::new("led")), telemetry.clone());
        assert!(!alarm.on_motion(&triggered(), Instant::now()));
        assert!(!alarm.is_active());
        assert_eq!(telemetry.read().total_alerts, 0);
    }

    #[test]
    fn actuator_failure_does_not_block_state() {
        let actuator = Arc::new(RecordingActuator {
            fail: true,
            ..Default::default()
        });
        let telemetry = SharedTelemetry::new(true);
        let alarm = AlarmController::new(AlarmConfig::default(), actuator.clone(), telemetry.clone());

        assert!(alarm.arm(Instant::now()));
        assert!(alarm.is_active());
        assert!(telemetry.read().alarm_active);
        assert_eq!(actuator.failures.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn command_parsing() {
        assert_eq!(AlarmCommand::parse("ALARM_ON"), Some(AlarmCommand::Arm));
        assert_eq!(AlarmCommand::parse("ALARM_OFF"), Some(AlarmCommand::Disarm));
        assert_eq!(AlarmCommand::parse("alarm_on"), None);
        assert_eq!(AlarmCommand::parse("SELF_DESTRUCT"), None);
    }

    #[test]
    fn concurrent_force_set_and_tick_stay_consistent() {
        let (alarm, _, telemetry) = controller();
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let alarm = alarm.clone();
                std::thread::spawn(move || {
                    for n in 0..500 {
                        if i % 2 == 0 {
                            alarm.force_set(n % 2 == 0, None);
                        } else {
                            alarm.tick(Instant::now() + Duration::from_secs(1));
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let snap = alarm.snapshot();
        assert_eq!(telemetry.read().alarm_active, snap.state == AlarmState::Active);
        if snap.state == AlarmState::Idle {
            assert!(!snap.actuator_on);
        }
    }

    #[tokio::test]
    async fn pulse_loop_toggles_and_stops() {
        let actuator = Arc::new(RecordingActuator::default());
        let config = AlarmConfig {
            pulse_interval: Duration::from_millis(20),
            tick_period: Duration::from_millis(5),
            trigger_on_motion: true,
        };
        let alarm = AlarmController::new(config, actuator.clone(), SharedTelemetry::new(true));
        let cancel = CancellationToken::new();
        let handle = spawn_pulse_loop(alarm.clone(), cancel.clone());

        alarm.arm(Instant::now());
        tokio::time::sleep(Duration::from_millis(150)).await;
        cancel.cancel();
        handle.await.unwrap();

        let writes = actuator.writes.lock();
        assert!(writes.len() >= 3, "expected pulses, got {:?}", *writes);
        assert_eq!(writes.first(), Some(&true));
        assert_eq!(writes.get(1), Some(&false));
        // Output is left low on shutdown
        assert_eq!(writes.last(), Some(&false));
    }

    #[tokio::test]
    async fn stopped_pulse_loop_reports_output_off() {
        let (alarm, actuator, telemetry) = controller();
        let cancel = CancellationToken::new();
        let handle = spawn_pulse_loop(alarm.clone(), cancel.clone());

        alarm.arm(Instant::now());
        assert!(alarm.snapshot().actuator_on);
        cancel.cancel();
        handle.await.unwrap();

        let snap = alarm.snapshot();
        assert_eq!(snap.state, AlarmState::Active);
        assert!(!snap.actuator_on);
        assert_eq!(actuator.writes.lock().last(), Some(&false));
        assert!(telemetry.read().alarm_active);
    }

    #[test]
    fn remote_command_status_is_published_with_the_alert() {
        let (alarm, _, telemetry) = controller();
        let writer = std::thread::spawn({
            let alarm = alarm.clone();
            move || {
                for n in 1..=2000u64 {
                    alarm.force_set(true, Some(&format!("on-{n}")));
                    alarm.force_set(false, Some(&format!("off-{n}")));
                }
            }
        });

        let mut torn = 0;
        while !writer.is_finished() {
            let t = telemetry.read();
            if t.total_alerts == 0 {
                continue;
            }
            let expected = if t.alarm_active {
                format!("on-{}", t.total_alerts)
            } else {
                format!("off-{}", t.total_alerts)
            };
            if t.detection_status != expected {
                torn += 1;
            }
        }
        writer.join().unwrap();

        assert_eq!(torn, 0, "status seen apart from its alarm state");
        let t = telemetry.read();
        assert_eq!(t.total_alerts, 2000);
        assert_eq!(t.detection_status, "off-2000");
    }
}
