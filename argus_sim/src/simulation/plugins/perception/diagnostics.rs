// argus_sim/src/simulation/plugins/perception/diagnostics.rs

use std::time::Duration;

use bevy::prelude::*;

use super::{Coordinator, LastTickReport, PerceptionSensor};

/// Throttles the periodic telemetry log.
#[derive(Resource)]
pub struct TelemetryTimer(pub Timer);

impl TelemetryTimer {
    pub fn from_secs(seconds: f32) -> Self {
        let seconds = if seconds > 0.0 { seconds } else { 1.0 };
        Self(Timer::new(Duration::from_secs_f32(seconds), TimerMode::Repeating))
    }
}

pub fn log_perception_telemetry(
    time: Res<Time>,
    mut timer: ResMut<TelemetryTimer>,
    coordinator: Res<Coordinator>,
    report: Res<LastTickReport>,
    sensors: Query<(&Name, &PerceptionSensor)>,
) {
    if !timer.0.tick(time.delta()).just_finished() {
        return;
    }

    let last = &report.0;
    info!(
        "[PERCEPTION] tick {} | {} | sync={} deferred={} drained={} skipped={}",
        last.tick,
        coordinator.0.telemetry(),
        last.synchronous_casts,
        last.newly_deferred,
        last.deferred_executed,
        last.deferred_skipped
    );
    for (name, sensor) in &sensors {
        debug!("  {}: {}", name.as_str(), sensor.provider.telemetry());
    }
}
