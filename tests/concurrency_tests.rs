use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use vigil_eye::{
    CameraConfig, CameraManager, CaptureDevice, DeviceProvider, FrameBuffer, FrameFormat, RenderSize, VisionError,
};

#[derive(Default)]
struct CountingProvider {
    open: Arc<AtomicUsize>,
}

struct CountedCamera {
    format: FrameFormat,
    open: Arc<AtomicUsize>,
    released: bool,
}

impl CaptureDevice for CountedCamera {
    fn read_frame(&mut self) -> Result<FrameBuffer, VisionError> {
        FrameBuffer::new(self.format, vec![7u8; self.format.byte_len().unwrap_or(0)])
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.open.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl DeviceProvider for CountingProvider {
    fn open(&self, _index: u32, format: FrameFormat) -> Result<Box<dyn CaptureDevice>, VisionError> {
        self.open.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(CountedCamera {
            format,
            open: self.open.clone(),
            released: false,
        }))
    }
}

fn config() -> CameraConfig {
    CameraConfig {
        relay_addr: "127.0.0.1:0".to_string(),
        frame_interval_ms: 5,
        request_format: FrameFormat::rgb(8, 6),
        response_format: FrameFormat::rgb(8, 6),
        render_size: RenderSize { width: 8, height: 6 },
        open_timeout_ms: 2000,
        ..CameraConfig::default()
    }
}

/// Raw-framed processor echoing frames until the session hangs up
fn spawn_echo(addr: std::net::SocketAddr) {
    tokio::spawn(async move {
        let Ok(mut stream) = TcpStream::connect(addr).await else {
            return;
        };
        let mut buf = [0u8; 8 * 6 * 3];
        while stream.read_exact(&mut buf).await.is_ok() {
            if stream.write_all(&buf).await.is_err() {
                return;
            }
        }
    });
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_open_same_camera() {
    let provider = Arc::new(CountingProvider::default());
    let manager = Arc::new(CameraManager::new(config(), provider.clone()).await.unwrap());
    let addr = manager.local_addr().unwrap();
    spawn_echo(addr);

    let mut handles = vec![];
    for _ in 0..8 {
        let manager = manager.clone();
        handles.push(tokio::spawn(async move { manager.open_camera(0).await }));
    }

    let mut opened = 0;
    let mut already_open = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(()) => opened += 1,
            Err(VisionError::AlreadyOpen(0)) => already_open += 1,
            Err(e) => panic!("Unexpected error: {}", e),
        }
    }

    assert_eq!(opened, 1);
    assert_eq!(already_open, 7);
    assert_eq!(provider.open.load(Ordering::SeqCst), 1);

    manager.close_all().await;
    assert_eq!(provider.open.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_many_cameras_stream_independently() {
    let provider = Arc::new(CountingProvider::default());
    let manager = Arc::new(CameraManager::new(config(), provider.clone()).await.unwrap());
    let addr = manager.local_addr().unwrap();

    for camera_id in 0..4 {
        spawn_echo(addr);
        manager.open_camera(camera_id).await.unwrap();
    }
    assert_eq!(manager.open_cameras(), vec![0, 1, 2, 3]);
    assert_eq!(provider.open.load(Ordering::SeqCst), 4);

    tokio::time::sleep(Duration::from_millis(150)).await;

    for camera_id in 0..4 {
        let frame = manager.latest_frame(camera_id).unwrap().unwrap();
        assert_eq!(frame.pixel(3, 3), Some([7, 7, 7]));
        assert!(manager.session_stats(camera_id).unwrap().frames_relayed > 0);
    }

    manager.close_camera(2).await.unwrap();
    assert_eq!(manager.open_cameras(), vec![0, 1, 3]);
    assert_eq!(provider.open.load(Ordering::SeqCst), 3);
    assert!(matches!(manager.close_camera(2).await, Err(VisionError::NotOpen(2))));

    manager.close_all().await;
    assert!(manager.open_cameras().is_empty());
    assert_eq!(provider.open.load(Ordering::SeqCst), 0);
}
