use async_trait::async_trait;
use parking_lot::Mutex;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::watch;
use vigil_dash::{Dashboard, DashboardConfig, DisplayConfig, DisplayPump, EmotionBars, PresentationSink};
use vigil_eye::{
    CaptureDevice, DeviceProvider, Framing, FrameBuffer, FrameFormat, RenderSize, SessionState, VisionError,
};
use vigil_sc::{
    AudioCaptureLoop, AudioConfig, AudioError, AudioSource, EmotionSlot, EmotionVector, LogitModel,
    SoftmaxClassifier,
};

#[derive(Default)]
struct Screen {
    bars: Mutex<Vec<EmotionBars>>,
    frames: Mutex<Vec<(u32, Arc<FrameBuffer>)>>,
    disconnects: Mutex<Vec<u32>>,
}

#[async_trait]
impl PresentationSink for Screen {
    async fn emotions(&self, bars: EmotionBars) {
        self.bars.lock().push(bars);
    }

    async fn frame(&self, camera_id: u32, frame: Arc<FrameBuffer>) {
        self.frames.lock().push((camera_id, frame));
    }

    async fn disconnected(&self, camera_id: u32, _reason: &str) {
        self.disconnects.lock().push(camera_id);
    }
}

/// Horizontal gradient: red channel equals x
struct Gradient(FrameFormat);

impl CaptureDevice for Gradient {
    fn read_frame(&mut self) -> Result<FrameBuffer, VisionError> {
        let FrameFormat { width, height, .. } = self.0;
        let mut data = Vec::with_capacity((width * height * 3) as usize);
        for _ in 0..height {
            for x in 0..width {
                data.extend_from_slice(&[x as u8, 0, 200]);
            }
        }
        FrameBuffer::new(self.0, data)
    }

    fn release(&mut self) {}
}

struct Gradients;

impl DeviceProvider for Gradients {
    fn open(&self, _index: u32, format: FrameFormat) -> Result<Box<dyn CaptureDevice>, VisionError> {
        Ok(Box::new(Gradient(format)))
    }
}

/// Length-prefixed processor that inverts every byte
fn spawn_inverter(addr: std::net::SocketAddr) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        loop {
            let mut len = [0u8; 4];
            if stream.read_exact(&mut len).await.is_err() {
                return;
            }
            let mut payload = vec![0u8; u32::from_be_bytes(len) as usize];
            if stream.read_exact(&mut payload).await.is_err() {
                return;
            }
            for byte in payload.iter_mut() {
                *byte = 255 - *byte;
            }
            if stream.write_all(&len).await.is_err() || stream.write_all(&payload).await.is_err() {
                return;
            }
        }
    })
}

fn write_config() -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(
        file,
        r#"
[audio]
enabled = false

[cameras]
relay_addr = "127.0.0.1:0"
framing = "length_prefixed"
frame_interval_ms = 10
open_timeout_ms = 1000

[cameras.request_format]
width = 16
height = 12
channels = 3

[cameras.response_format]
width = 16
height = 12
channels = 3

[cameras.render_size]
width = 16
height = 12

[display]
frame_tick_ms = 10
"#
    )
    .unwrap();
    file
}

#[tokio::test]
async fn test_processed_frames_reach_the_screen() {
    let file = write_config();
    let config = DashboardConfig::load(file.path()).unwrap();
    assert_eq!(config.cameras.framing, Framing::LengthPrefixed);

    let screen = Arc::new(Screen::default());
    let dashboard = Dashboard::start(&config, Arc::new(Gradients), screen.clone(), None)
        .await
        .unwrap();
    let addr = dashboard.cameras().local_addr().unwrap();
    let _processor = spawn_inverter(addr);

    assert_eq!(dashboard.open_cameras(&[2]).await, vec![2]);
    assert_eq!(dashboard.cameras().session_state(2), SessionState::Streaming);

    tokio::time::sleep(Duration::from_millis(200)).await;

    let frame = dashboard.cameras().latest_frame(2).unwrap().unwrap();
    assert_eq!((frame.width(), frame.height()), (16, 12));
    assert_eq!(frame.pixel(0, 0), Some([255, 255, 55]));
    assert_eq!(frame.pixel(5, 7), Some([250, 255, 55]));

    dashboard
        .cameras()
        .set_render_size(2, RenderSize { width: 32, height: 12 })
        .unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;

    let frame = dashboard.cameras().latest_frame(2).unwrap().unwrap();
    assert_eq!((frame.width(), frame.height()), (32, 12));
    // 16x12 fits 32x12 at height 12: black bars left and right
    assert_eq!(frame.pixel(0, 6), Some([0, 0, 0]));
    assert_eq!(frame.pixel(31, 6), Some([0, 0, 0]));

    let stats = dashboard.cameras().session_stats(2).unwrap();
    assert!(stats.frames_relayed >= 5);
    assert_eq!(stats.decode_failures, 0);

    dashboard.shutdown().await.unwrap();

    let frames = screen.frames.lock();
    assert!(frames.iter().all(|(id, _)| *id == 2));
    assert!(frames.iter().any(|(_, f)| f.width() == 16));
    assert!(frames.iter().any(|(_, f)| f.width() == 32));
    assert!(screen.disconnects.lock().is_empty());
    assert!(screen.bars.lock().is_empty());
}

struct Hum;

impl AudioSource for Hum {
    fn record(&mut self, duration: Duration, sample_rate: u32) -> Result<Vec<f32>, AudioError> {
        std::thread::sleep(duration);
        Ok(vec![0.1; (duration.as_secs_f64() * sample_rate as f64) as usize])
    }
}

/// Logits in stock label order: neutral, happy, sad, angry, other
struct MostlySad;

impl LogitModel for MostlySad {
    fn logits(&mut self, _samples: &[f32], _sample_rate: u32) -> Result<Vec<f32>, AudioError> {
        Ok(vec![2.0, 0.0, 10.0, 0.0, 0.0])
    }
}

#[tokio::test]
async fn test_emotion_bars_follow_the_classifier() {
    let audio = AudioConfig {
        clip_duration_ms: 10,
        smoothing_alpha: 0.1,
        ..AudioConfig::default()
    };
    let (worker, raw) =
        AudioCaptureLoop::new(audio.clone(), Hum, SoftmaxClassifier::with_default_labels(MostlySad)).unwrap();
    let handle = worker.spawn().unwrap();

    let screen = Arc::new(Screen::default());
    let display = DisplayConfig {
        emotion_tick_ms: 5,
        frame_tick_ms: 30,
    };
    let pump = DisplayPump::new(display, audio.smoothing_alpha, screen.clone())
        .with_emotions(raw)
        .spawn();

    tokio::time::sleep(Duration::from_millis(500)).await;
    pump.stop().await;
    tokio::task::spawn_blocking(move || handle.join())
        .await
        .unwrap()
        .unwrap();

    let bars = screen.bars.lock();
    let last = *bars.last().unwrap();
    let sad = last.get(EmotionSlot::Sad);
    for slot in EmotionSlot::ALL {
        if slot != EmotionSlot::Sad {
            assert!(last.get(slot) < sad, "{} bar above sad", slot);
        }
    }
    assert!(last.get(EmotionSlot::Neutral) > last.get(EmotionSlot::Happy));
    assert!(sad <= 100.0);
}

#[tokio::test]
async fn test_pump_holds_bars_when_audio_stalls() {
    let (raw_tx, raw_rx) = watch::channel(EmotionVector::default());
    let screen = Arc::new(Screen::default());
    let pump = DisplayPump::new(
        DisplayConfig {
            emotion_tick_ms: 5,
            frame_tick_ms: 30,
        },
        1.0,
        screen.clone(),
    )
    .with_emotions(raw_rx)
    .spawn();

    raw_tx.send_replace(EmotionVector::new([0.0, 0.0, 0.0, 0.4, 0.0]));
    tokio::time::sleep(Duration::from_millis(60)).await;
    // No new vector arrives; the bars keep showing the last one
    tokio::time::sleep(Duration::from_millis(60)).await;
    pump.stop().await;

    let bars = screen.bars.lock();
    let last = *bars.last().unwrap();
    assert!((last.get(EmotionSlot::Happy) - 40.0).abs() < 1e-3);
    assert_eq!(last.get(EmotionSlot::Sad), 0.0);
}
