// Performance scenarios driven through the public pad API with an offline mixer.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use dynamicpad::assets::{AudioSlot, BoundAssets};
use dynamicpad::audio::{AudioClip, AudioConfig, AudioEngine};
use dynamicpad::config::{InputPreference, PadConfig};
use dynamicpad::error::RecordError;
use dynamicpad::record::{
    Artifact, ContainerFormat, RecorderBackend, RecorderEvent, RecorderHandle, SessionEndpoint,
    SessionPlan, StartOutcome,
};
use dynamicpad::{AssetBinder, MediaDescriptor, MediaKind, Pad, PadEvent, RecordingState, TouchPoint};

const RATE: u32 = 1000;
const MS: Duration = Duration::from_millis(1);

#[derive(Default)]
struct Sessions {
    plans: Vec<SessionPlan>,
    endpoints: Vec<SessionEndpoint>,
}

struct FakeBackend(Arc<Mutex<Sessions>>);

impl RecorderBackend for FakeBackend {
    fn available(&self) -> bool {
        true
    }

    fn supports(&self, format: ContainerFormat) -> bool {
        format == ContainerFormat::WebmVp9
    }

    fn start(&mut self, plan: SessionPlan) -> Result<RecorderHandle, RecordError> {
        let (handle, endpoint) = RecorderHandle::channel();
        let mut sessions = self.0.lock().unwrap();
        sessions.plans.push(plan);
        sessions.endpoints.push(endpoint);
        Ok(handle)
    }
}

fn config(layers: usize, input: InputPreference) -> PadConfig {
    let mut config = PadConfig::default();
    config.media = (0..layers)
        .map(|i| MediaDescriptor::new(format!("loop{i}"), format!("loop{i}.wav"), MediaKind::Audio))
        .collect();
    config.engine.input = input;
    config.engine.viewport_width = 64;
    config.engine.viewport_height = 64;
    config
}

fn slots(playable: &[bool]) -> Vec<AudioSlot> {
    playable
        .iter()
        .enumerate()
        .map(|(i, &ok)| AudioSlot {
            id: format!("loop{i}"),
            clip: ok.then(|| Arc::new(AudioClip::new(vec![0.25; 200], RATE))),
        })
        .collect()
}

fn audio_config() -> AudioConfig {
    AudioConfig {
        sample_rate: RATE,
        ..AudioConfig::default()
    }
}

fn offline_pad(playable: &[bool], input: InputPreference) -> (Pad, Arc<Mutex<Sessions>>) {
    let assets = BoundAssets::new(slots(playable), vec![], vec![]);
    let audio = AudioEngine::offline(assets.clips(), &audio_config());
    let sessions = Arc::new(Mutex::new(Sessions::default()));
    let pad = Pad::assemble(
        config(playable.len(), input),
        assets,
        audio,
        Box::new(FakeBackend(Arc::clone(&sessions))),
        true,
    );
    (pad, sessions)
}

fn render(pad: &mut Pad, samples: usize) -> Vec<f32> {
    let mut out = vec![0.0; samples];
    pad.render_audio(&mut out);
    out
}

fn playing(pad: &Pad, layer: usize) -> bool {
    pad.offline_mixer().is_some_and(|m| m.is_playing(layer))
}

#[test]
fn two_keys_layer_and_release_independently() {
    let (mut pad, _) = offline_pad(&[true, true], InputPreference::Keyboard);
    let t0 = Instant::now();

    pad.key_down('k', t0);
    pad.key_down('b', t0);
    pad.frame(t0);
    let out = render(&mut pad, 100);
    assert!(pad.is_active(0) && pad.is_active(1));
    // Both loops at full gain after the 50 ms fade.
    assert!((out[99] - 0.5).abs() < 1e-5);

    pad.key_up('k');
    pad.frame(t0 + 20 * MS);
    assert!(!pad.is_active(0));
    assert!(pad.is_active(1));
    render(&mut pad, 100);
    // Faded out but not stopped until the stop delay passes.
    assert!(playing(&pad, 0));

    pad.frame(t0 + 90 * MS);
    let out = render(&mut pad, 10);
    assert!(!playing(&pad, 0));
    assert!(playing(&pad, 1));
    assert!((out[9] - 0.25).abs() < 1e-5);
}

#[test]
fn dragging_switches_layers_and_lifting_releases() {
    let (mut pad, _) = offline_pad(&[true, true], InputPreference::Pointer);
    let t0 = Instant::now();
    let (w, h) = pad.canvas().dimensions();
    let (w, h) = (w as f32, h as f32);

    pad.touch_start(&[TouchPoint::new(7, w * 0.25, h * 0.5)], t0);
    assert!(pad.is_active(0));

    pad.touch_move(&[TouchPoint::new(7, w * 0.30, h * 0.5)], t0 + 5 * MS);
    assert!(pad.is_active(0));

    pad.touch_move(&[TouchPoint::new(7, w * 0.75, h * 0.5)], t0 + 10 * MS);
    assert!(!pad.is_active(0));
    assert!(pad.is_active(1));

    pad.touch_end(&[TouchPoint::new(7, w * 0.75, h * 0.5)], t0 + 20 * MS);
    assert!(!pad.is_active(1));
    assert_eq!(pad.active_touches(), 0);
}

#[test]
fn touch_outside_the_surface_is_ignored() {
    let (mut pad, _) = offline_pad(&[true], InputPreference::Pointer);
    let (w, _) = pad.canvas().dimensions();
    pad.touch_start(&[TouchPoint::new(1, w as f32 + 50.0, 5.0)], Instant::now());
    assert!(!pad.is_active(0));
    assert_eq!(pad.active_touches(), 0);
}

#[test]
fn holding_a_key_does_not_restart_the_loop() {
    let (mut pad, _) = offline_pad(&[true], InputPreference::Keyboard);
    let t0 = Instant::now();

    pad.key_down('k', t0);
    pad.frame(t0);
    render(&mut pad, 120);
    for i in 1..10 {
        pad.frame(t0 + i * 16 * MS);
    }
    let out = render(&mut pad, 10);
    let mixer = pad.offline_mixer().unwrap();
    assert!((mixer.gain(0) - 1.0).abs() < 1e-6);
    assert!((out[0] - 0.25).abs() < 1e-6);
}

#[test]
fn pressing_again_inside_the_stop_delay_keeps_playing() {
    let (mut pad, _) = offline_pad(&[true], InputPreference::Keyboard);
    let t0 = Instant::now();

    pad.key_down('k', t0);
    pad.frame(t0);
    pad.key_up('k');
    pad.frame(t0 + 16 * MS);
    assert!(!pad.is_active(0));

    pad.key_down('k', t0 + 30 * MS);
    pad.frame(t0 + 32 * MS);
    assert!(pad.is_active(0));

    pad.frame(t0 + 200 * MS);
    render(&mut pad, 200);
    assert!(pad.is_active(0));
    assert!(playing(&pad, 0));
}

#[test]
fn failed_layer_keeps_its_slot_and_stays_silent() {
    let (mut pad, _) = offline_pad(&[false, true], InputPreference::Keyboard);
    let t0 = Instant::now();
    assert_eq!(pad.layer_count(), 2);
    assert_eq!(pad.key_for_layer(1), Some('b'));

    pad.key_down('k', t0);
    pad.key_down('b', t0);
    pad.frame(t0);
    assert!(!pad.is_active(0));
    assert!(pad.is_active(1));
    render(&mut pad, 10);
    assert!(!playing(&pad, 0));
}

#[test]
fn binding_reports_failures_without_losing_order() {
    let dir = tempfile::tempdir().unwrap();
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(dir.path().join("good.wav"), spec).unwrap();
    for i in 0..500 {
        writer.write_sample(((i % 50) * 200) as i16).unwrap();
    }
    writer.finalize().unwrap();

    let media = vec![
        MediaDescriptor::new("missing", "missing.wav", MediaKind::Audio),
        MediaDescriptor::new("good", "good.wav", MediaKind::Audio),
    ];
    let binder = AssetBinder::new(Some(dir.path().to_path_buf()), RATE);
    let assets = binder.bind(&media, Instant::now());
    assert_eq!(assets.layer_count(), 2);
    assert!(!assets.is_playable(0));
    assert!(assets.is_playable(1));

    let mut config = config(0, InputPreference::Keyboard);
    config.media = media;
    let audio = AudioEngine::offline(assets.clips(), &audio_config());
    let sessions = Arc::new(Mutex::new(Sessions::default()));
    let mut pad = Pad::assemble(config, assets, audio, Box::new(FakeBackend(sessions)), true);

    let events = pad.drain_events();
    assert!(matches!(
        events.as_slice(),
        [PadEvent::AssetFailed { index: 0, id, .. }] if id == "missing"
    ));
    assert_eq!(pad.layer_id(1), Some("good"));
}

#[test]
fn stopping_a_take_leaves_held_layers_sounding() {
    let (mut pad, sessions) = offline_pad(&[true], InputPreference::Keyboard);
    let t0 = Instant::now();

    pad.key_down('k', t0);
    pad.frame(t0);
    pad.start_recording(t0).unwrap();
    pad.frame(t0 + 20 * MS);
    assert!(pad.is_active(0));

    assert!(pad.stop_recording());
    pad.frame(t0 + 40 * MS);
    assert!(pad.is_active(0));
    assert_eq!(pad.recording_state(), &RecordingState::Finalizing);
    assert!(sessions.lock().unwrap().endpoints[0].stop.try_recv().is_ok());

    // Past fade and stop delay: no fade-out or stop reached the mixer.
    let out = render(&mut pad, 150);
    assert!(playing(&pad, 0));
    let gain = pad.offline_mixer().map_or(0.0, |m| m.gain(0));
    assert!((gain - 1.0).abs() < 1e-5);
    assert!((out[149] - 0.25).abs() < 1e-5);
}

#[test]
fn releasing_layers_mid_take_keeps_recording() {
    let (mut pad, sessions) = offline_pad(&[true], InputPreference::Keyboard);
    let t0 = Instant::now();

    pad.key_down('k', t0);
    pad.frame(t0);
    pad.start_recording(t0).unwrap();
    pad.frame(t0 + 20 * MS);
    let before = sessions.lock().unwrap().endpoints[0].frames.try_iter().count();
    assert!(before >= 1);

    pad.key_up('k');
    pad.frame(t0 + 40 * MS);
    assert!(!pad.is_active(0));
    render(&mut pad, 50);
    pad.frame(t0 + 150 * MS);
    render(&mut pad, 10);
    assert!(!playing(&pad, 0));

    pad.frame(t0 + 200 * MS);
    assert!(matches!(pad.recording_state(), RecordingState::Recording { .. }));
    let sessions = sessions.lock().unwrap();
    assert!(sessions.endpoints[0].frames.try_iter().count() >= 1);
    assert!(sessions.endpoints[0].stop.try_recv().is_err());
}

#[test]
fn recording_start_is_idempotent_and_exports() {
    let (mut pad, sessions) = offline_pad(&[true], InputPreference::Keyboard);
    let t0 = Instant::now();

    let first = pad.start_recording(t0).unwrap();
    assert_eq!(
        first,
        StartOutcome::Started {
            format: ContainerFormat::WebmVp9,
            with_audio: true
        }
    );
    assert_eq!(pad.start_recording(t0).unwrap(), StartOutcome::AlreadyRecording);
    assert_eq!(sessions.lock().unwrap().plans.len(), 1);

    pad.frame(t0 + 40 * MS);
    {
        let sessions = sessions.lock().unwrap();
        let frames = sessions.endpoints[0].frames.try_iter().count();
        assert!(frames >= 1);
        assert_eq!(sessions.plans[0].filename_prefix, "dynamic-pad");
    }

    assert!(pad.stop_recording());
    let artifact = Artifact {
        path: PathBuf::from("take.webm"),
        filename: "take.webm".into(),
        mime_type: ContainerFormat::WebmVp9.mime_type(),
        bytes: 42,
        with_audio: true,
    };
    {
        let sessions = sessions.lock().unwrap();
        let filename = sessions.endpoints[0].stop.try_recv().unwrap();
        assert!(filename.starts_with("dynamic-pad-") && filename.ends_with(".webm"));
        sessions.endpoints[0]
            .events
            .send(RecorderEvent::Stopped(artifact.clone()))
            .unwrap();
    }

    pad.drain_events();
    pad.frame(t0 + 60 * MS);
    assert_eq!(pad.recording_state(), &RecordingState::Exported(artifact.clone()));
    assert_eq!(pad.latest_recording(), Some(&artifact));
    assert!(pad.drain_events().contains(&PadEvent::RecordingReady(artifact)));
}

#[test]
fn silent_audio_records_video_only() {
    let assets = BoundAssets::new(slots(&[true]), vec![], vec![]);
    let sessions = Arc::new(Mutex::new(Sessions::default()));
    let mut pad = Pad::assemble(
        config(1, InputPreference::Keyboard),
        assets,
        AudioEngine::silent(&audio_config()),
        Box::new(FakeBackend(Arc::clone(&sessions))),
        true,
    );

    let outcome = pad.start_recording(Instant::now()).unwrap();
    assert!(matches!(outcome, StartOutcome::Started { with_audio: false, .. }));
    assert!(sessions.lock().unwrap().plans[0].audio.is_none());
}

#[test]
fn finish_recording_waits_for_the_file() {
    let (mut pad, sessions) = offline_pad(&[true], InputPreference::Keyboard);
    pad.start_recording(Instant::now()).unwrap();

    let worker = {
        let sessions = Arc::clone(&sessions);
        std::thread::spawn(move || {
            let (stop, events) = {
                let sessions = sessions.lock().unwrap();
                (sessions.endpoints[0].stop.clone(), sessions.endpoints[0].events.clone())
            };
            stop.recv_timeout(Duration::from_secs(5)).unwrap();
            events
                .send(RecorderEvent::Error("muxer exited with status 1".into()))
                .unwrap();
        })
    };

    assert_eq!(pad.finish_recording(Duration::from_secs(5)), None);
    worker.join().unwrap();
    assert!(matches!(pad.recording_state(), RecordingState::Failed(_)));
    assert_eq!(pad.record_error(), Some("Recording failed. Please try again."));
}

#[test]
fn teardown_twice_is_harmless() {
    let (mut pad, sessions) = offline_pad(&[true, true], InputPreference::Keyboard);
    let t0 = Instant::now();
    pad.key_down('k', t0);
    pad.frame(t0);
    pad.start_recording(t0).unwrap();

    pad.teardown();
    pad.teardown();
    assert!(!pad.is_active(0));
    assert_eq!(pad.recording_state(), &RecordingState::Idle);
    assert!(sessions.lock().unwrap().endpoints[0].stop.try_recv().is_ok());

    pad.key_down('b', t0);
    pad.frame(t0 + 16 * MS);
    assert!(!pad.is_active(1));
}
