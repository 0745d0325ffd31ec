//! Jukebox runtime.
//!
//! Wires the components together and drives the main control loop. Shutdown order on inactivity:
//! stop playback, halt the NFC thread and the HTTP server, then ask the platform to power off.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use audio_player::{AudioEngine, CpalEngine, device};
use crossbeam_channel::Receiver;

use crate::clock::MonotonicClock;
use crate::config::{JukeboxConfig, PlaybackConfig};
use crate::gateway::ConfigGateway;
use crate::hardware::{FileTagReader, SysfsInputs};
use crate::http_api::{self, ApiState, HttpServerHandle};
use crate::input::{InputPins, InputSampler, InputTiming, VolumeScale};
use crate::mdns::{self, MdnsAdvertiser};
use crate::nfc::{self, NfcPoller, NfcTaskHandle};
use crate::persist::{MappingFile, MappingPersistence};
use crate::player::{PlaybackController, PlayerCommand, SeekSteps};
use crate::power::{CommandPowerControl, PowerControl};
use crate::status::{PlayerStatus, StatusSources, TagPresence};
use crate::store::{MappingStore, SharedStore};
use crate::watchdog::{ActivityClock, Watchdog};

/// Result of one control-loop pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopStep {
    Continue,
    /// The inactivity timeout elapsed.
    Idle,
}

/// Single-threaded part of the jukebox: commands, buttons, knob, playback and the watchdog.
pub struct MainLoop<E, P, I> {
    controller: PlaybackController<E, P>,
    sampler: InputSampler,
    pins: I,
    watchdog: Watchdog,
    commands: Receiver<PlayerCommand>,
}

impl<E: AudioEngine, P: PowerControl, I: InputPins> MainLoop<E, P, I> {
    pub fn new(
        controller: PlaybackController<E, P>,
        sampler: InputSampler,
        pins: I,
        watchdog: Watchdog,
        commands: Receiver<PlayerCommand>,
    ) -> Self {
        Self {
            controller,
            sampler,
            pins,
            watchdog,
            commands,
        }
    }

    pub fn controller(&self) -> &PlaybackController<E, P> {
        &self.controller
    }

    pub fn step(&mut self, now_ms: u64) -> LoopStep {
        while let Ok(command) = self.commands.try_recv() {
            self.controller.apply(command);
        }

        let levels = self.pins.read_buttons();
        if let Some(event) = self.sampler.poll_buttons(levels, now_ms) {
            self.controller.handle_input(event);
        }

        if let Some(raw) = self.pins.read_volume_raw() {
            if self.sampler.sample_volume(raw) {
                self.controller.set_volume(self.sampler.read_volume());
            }
        }

        self.controller.tick();

        if self.watchdog.check(now_ms) {
            LoopStep::Idle
        } else {
            LoopStep::Continue
        }
    }

    /// Stop playback, halt the background services, then power down if the box went idle.
    pub fn shutdown(&mut self, reason: ExitReason, halt_services: impl FnOnce()) {
        self.controller.stop();
        halt_services();
        if reason == ExitReason::Inactivity && self.controller.request_power_down() {
            tracing::info!("power-down requested");
        }
    }
}

/// Background services halted during shutdown.
struct Services {
    nfc: NfcTaskHandle,
    http: HttpServerHandle,
    mdns: Option<MdnsAdvertiser>,
}

impl Services {
    fn halt(self) {
        self.nfc.stop();
        if let Some(ad) = self.mdns.as_ref() {
            ad.shutdown();
        }
        self.http.stop();
        tracing::info!("background services stopped");
    }
}

/// Why the control loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    Inactivity,
    Interrupted,
}

/// Print output devices to stdout.
pub fn list_devices() -> Result<()> {
    let host = cpal::default_host();
    device::list_devices(&host)
}

/// Play one file to the end (or Ctrl-C) at the configured volume.
pub fn run_play(path: &Path, playback: PlaybackConfig, volume: u8, max_volume: u8) -> Result<()> {
    let mut engine = CpalEngine::new(playback, volume, max_volume);
    let info = engine
        .open(path)
        .with_context(|| format!("play {}", path.display()))?;
    tracing::info!(
        path = %path.display(),
        rate_hz = info.sample_rate,
        channels = info.channels,
        duration_ms = info.duration.map(|d| d.as_millis() as u64),
        "playing"
    );
    let interrupted = interrupt_flag(true);
    while !engine.is_finished() && !interrupted.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(100));
    }
    engine.stop();
    Ok(())
}

/// Run the jukebox until the inactivity timeout (then power down) or Ctrl-C.
pub fn run(config: JukeboxConfig, install_ctrlc: bool) -> Result<()> {
    let clock = MonotonicClock::shared();
    let activity = ActivityClock::new(clock.clone());
    let max_slots = config.store.max_slots;

    let persistence = Arc::new(MappingFile::new(&config.mappings_file, max_slots));
    let rows = persistence
        .load()
        .context("load mappings; refusing to start and overwrite them")?;
    let store = SharedStore::new(MappingStore::from_rows(max_slots, rows));
    tracing::info!(
        mappings = store.list().len(),
        max_slots,
        file = %config.mappings_file.display(),
        "mappings loaded"
    );

    let presence = TagPresence::default();
    let player_status =
        PlayerStatus::shared(config.playback.initial_volume, config.playback.max_volume);
    let gateway = Arc::new(ConfigGateway::new(
        store.clone(),
        persistence,
        activity.clone(),
    ));

    let http = http_api::spawn_http_server(
        config.http_bind,
        ApiState {
            gateway,
            status: StatusSources {
                player: player_status.clone(),
                presence: presence.clone(),
                activity: activity.clone(),
                shutdown_timeout_ms: config.timing.shutdown_timeout_ms,
            },
            music_dir: config.music_dir.clone(),
        },
    )?;
    let mdns = if config.mdns {
        mdns::spawn_mdns_advertiser(config.http_bind)
    } else {
        None
    };

    let (cmd_tx, cmd_rx) = crossbeam_channel::unbounded();
    let poller = NfcPoller::new(
        FileTagReader::new(&config.hardware.tag_file),
        store,
        config.music_dir.clone(),
        cmd_tx,
        activity.clone(),
        presence,
    );
    let nfc = nfc::spawn_nfc_task(
        poller,
        Duration::from_millis(config.timing.nfc_read_interval_ms),
    )
    .context("spawn nfc thread")?;
    let services = Services { nfc, http, mdns };

    let mut main_loop = build_main_loop(&config, activity, player_status, cmd_rx);
    let interrupted = interrupt_flag(install_ctrlc);
    let loop_interval = Duration::from_millis(config.timing.loop_interval_ms);
    tracing::info!(
        music_dir = %config.music_dir.display(),
        shutdown_timeout_ms = config.timing.shutdown_timeout_ms,
        "jukebox running"
    );

    let reason = loop {
        if interrupted.load(Ordering::SeqCst) {
            break ExitReason::Interrupted;
        }
        if main_loop.step(clock.now_ms()) == LoopStep::Idle {
            tracing::info!("no activity; shutting down");
            break ExitReason::Inactivity;
        }
        thread::sleep(loop_interval);
    };

    main_loop.shutdown(reason, || services.halt());
    Ok(())
}

fn build_main_loop(
    config: &JukeboxConfig,
    activity: ActivityClock,
    player_status: crate::status::SharedPlayerStatus,
    commands: Receiver<PlayerCommand>,
) -> MainLoop<CpalEngine, CommandPowerControl, SysfsInputs> {
    let p = &config.playback;
    let engine = CpalEngine::new(config.playback_config(), p.initial_volume, p.max_volume);
    let controller = PlaybackController::new(
        engine,
        CommandPowerControl::new(config.hardware.poweroff_command.clone()),
        SeekSteps {
            forward_secs: p.forward_seek_sec,
            backward_secs: p.backward_seek_sec,
        },
        p.initial_volume,
        player_status,
    );
    let sampler = InputSampler::new(
        InputTiming {
            debounce_delay_ms: config.timing.debounce_delay_ms,
            repeat_delay_ms: config.timing.repeat_delay_ms,
        },
        VolumeScale {
            samples: p.volume_samples,
            adc_max: p.adc_max,
            max_volume: p.max_volume,
        },
        p.initial_volume,
        activity.clone(),
    );
    let pins = SysfsInputs {
        forward: config.hardware.forward_gpio.clone(),
        backward: config.hardware.backward_gpio.clone(),
        volume: config.hardware.volume_adc.clone(),
    };
    let watchdog = Watchdog::new(activity, config.timing.shutdown_timeout_ms);
    MainLoop::new(controller, sampler, pins, watchdog, commands)
}

fn interrupt_flag(install: bool) -> Arc<AtomicBool> {
    let flag = Arc::new(AtomicBool::new(false));
    if install {
        let for_signal = flag.clone();
        if let Err(e) = ctrlc::set_handler(move || {
            for_signal.store(true, Ordering::SeqCst);
        }) {
            tracing::warn!(error = %e, "ctrl-c handler not installed");
        }
    }
    flag
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::testing::ManualClock;
    use crate::input::ButtonLevels;
    use crate::player::testing::FakeEngine;
    use std::path::PathBuf;
    use std::sync::Mutex;

    /// Scripted pins shared with the test body.
    #[derive(Clone, Default)]
    struct FakePins {
        levels: Arc<Mutex<ButtonLevels>>,
        volume: Arc<Mutex<Option<u16>>>,
    }

    impl InputPins for FakePins {
        fn read_buttons(&mut self) -> ButtonLevels {
            *self.levels.lock().unwrap()
        }

        fn read_volume_raw(&mut self) -> Option<u16> {
            *self.volume.lock().unwrap()
        }
    }

    /// Records whether playback was already stopped when power-down was requested.
    #[derive(Clone)]
    struct OrderedPower {
        engine: FakeEngine,
        calls: Arc<Mutex<Vec<bool>>>,
    }

    impl PowerControl for OrderedPower {
        fn request_shutdown(&mut self) {
            let stopped = !self.engine.inspect().loaded;
            self.calls.lock().unwrap().push(stopped);
        }
    }

    struct Rig {
        clock: Arc<ManualClock>,
        engine: FakeEngine,
        pins: FakePins,
        power_calls: Arc<Mutex<Vec<bool>>>,
        commands: crossbeam_channel::Sender<PlayerCommand>,
        main: MainLoop<FakeEngine, OrderedPower, FakePins>,
    }

    fn rig(timeout_ms: u64) -> Rig {
        let clock = ManualClock::at(0);
        let activity = ActivityClock::new(clock.clone());
        let engine = FakeEngine::with_duration(600);
        let power_calls = Arc::new(Mutex::new(Vec::new()));
        let power = OrderedPower {
            engine: engine.clone(),
            calls: power_calls.clone(),
        };
        let controller = PlaybackController::new(
            engine.clone(),
            power,
            SeekSteps {
                forward_secs: 30,
                backward_secs: -10,
            },
            10,
            PlayerStatus::shared(10, 21),
        );
        let sampler = InputSampler::new(
            InputTiming {
                debounce_delay_ms: 50,
                repeat_delay_ms: 300,
            },
            VolumeScale {
                samples: 4,
                adc_max: 4095,
                max_volume: 21,
            },
            10,
            activity.clone(),
        );
        let pins = FakePins::default();
        let (tx, rx) = crossbeam_channel::unbounded();
        let main = MainLoop::new(
            controller,
            sampler,
            pins.clone(),
            Watchdog::new(activity, timeout_ms),
            rx,
        );
        Rig {
            clock,
            engine,
            pins,
            power_calls,
            commands: tx,
            main,
        }
    }

    fn play(path: &str) -> PlayerCommand {
        PlayerCommand::Play {
            path: PathBuf::from(path),
            tag_id: Some("04A1".to_string()),
        }
    }

    #[test]
    fn play_commands_are_drained_each_pass() {
        let mut r = rig(120_000);
        r.commands.send(play("/music/song1.mp3")).unwrap();
        assert_eq!(r.main.step(0), LoopStep::Continue);
        assert!(r.main.controller().state().is_playing);
        assert_eq!(
            r.engine.inspect().opened,
            vec![PathBuf::from("/music/song1.mp3")]
        );
    }

    #[test]
    fn button_press_seeks_forward() {
        let mut r = rig(120_000);
        r.commands.send(play("/music/song1.mp3")).unwrap();
        r.main.step(0);
        r.pins.levels.lock().unwrap().forward = true;
        for t in (5..=60).step_by(5) {
            r.main.step(t);
        }
        assert_eq!(r.main.controller().state().position, Duration::from_secs(30));
    }

    #[test]
    fn knob_updates_volume_after_full_window() {
        let mut r = rig(120_000);
        *r.pins.volume.lock().unwrap() = Some(4095);
        for t in 0..3 {
            r.main.step(t);
        }
        assert_eq!(r.main.controller().state().volume, 10);
        r.main.step(3);
        assert_eq!(r.main.controller().state().volume, 21);
        assert_eq!(r.engine.inspect().volume, Some(21));
    }

    #[test]
    fn inactivity_stops_playback_then_powers_down_once() {
        let mut r = rig(120_000);
        r.commands.send(play("/music/song1.mp3")).unwrap();
        assert_eq!(r.main.step(0), LoopStep::Continue);
        assert_eq!(r.main.step(119_999), LoopStep::Continue);

        r.clock.set(120_000);
        assert_eq!(r.main.step(120_000), LoopStep::Idle);
        assert_eq!(r.main.step(120_005), LoopStep::Continue);

        let halted_after_stop = Arc::new(Mutex::new(Vec::new()));
        for _ in 0..2 {
            let engine = r.engine.clone();
            let power_calls = r.power_calls.clone();
            let halted = halted_after_stop.clone();
            r.main.shutdown(ExitReason::Inactivity, move || {
                let stopped = !engine.inspect().loaded;
                halted
                    .lock()
                    .unwrap()
                    .push(stopped && power_calls.lock().unwrap().is_empty());
            });
        }

        assert!(!r.main.controller().state().is_playing);
        assert_eq!(r.engine.inspect().stops, 1);
        assert!(halted_after_stop.lock().unwrap()[0]);
        assert_eq!(*r.power_calls.lock().unwrap(), vec![true]);
    }

    #[test]
    fn interrupt_stops_without_powering_down() {
        let mut r = rig(120_000);
        r.commands.send(play("/music/song1.mp3")).unwrap();
        r.main.step(0);
        let mut halted = false;
        r.main.shutdown(ExitReason::Interrupted, || halted = true);
        assert!(halted);
        assert_eq!(r.engine.inspect().stops, 1);
        assert!(r.power_calls.lock().unwrap().is_empty());
    }

    #[test]
    fn button_activity_postpones_shutdown() {
        let mut r = rig(1_000);
        r.clock.set(900);
        r.pins.levels.lock().unwrap().backward = true;
        r.main.step(900);
        assert_eq!(r.main.step(950), LoopStep::Continue);
        r.pins.levels.lock().unwrap().backward = false;
        assert_eq!(r.main.step(1_500), LoopStep::Continue);
        assert_eq!(r.main.step(1_950), LoopStep::Idle);
    }
}
