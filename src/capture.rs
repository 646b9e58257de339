// src/capture.rs - Frame sources feeding the processing pipeline
use anyhow::{Context, Result};
use image::DynamicImage;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[cfg(feature = "camera")]
use std::sync::mpsc;
#[cfg(feature = "camera")]
use std::thread::JoinHandle;

/// One captured frame. The image is shared so the pipeline can hand it out
/// without copying.
#[derive(Debug, Clone)]
pub struct Frame {
    pub index: u64,
    pub width: u32,
    pub height: u32,
    pub image: Option<Arc<DynamicImage>>,
}

/// Anything that yields frames until its stream ends.
pub trait FrameSource: Send {
    /// Next frame, or `None` at end of stream.
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    fn dimensions(&self) -> (u32, u32);

    /// Whether frames arrive in real time whether or not anyone keeps up.
    /// Recordings return `false` and are replayed without loss.
    fn is_live(&self) -> bool {
        false
    }
}

/// A directory of still images played back in file name order.
pub struct ImageSequence {
    path: PathBuf,
    frames: Vec<PathBuf>,
    current_frame: usize,
    width: u32,
    height: u32,
    frame_interval: Option<Duration>,
}

impl ImageSequence {
    pub fn new(path: impl AsRef<Path>, fps: Option<f32>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if !path.is_dir() {
            return Err(anyhow::anyhow!("Frame directory does not exist: {}", path.display()));
        }

        let mut frames: Vec<PathBuf> = std::fs::read_dir(&path)
            .with_context(|| format!("Cannot read frame directory {}", path.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| matches!(ext.to_ascii_lowercase().as_str(), "png" | "jpg" | "jpeg"))
            })
            .collect();
        frames.sort();

        let first = frames
            .first()
            .ok_or_else(|| anyhow::anyhow!("No frames found in {}", path.display()))?;
        let (width, height) = image::image_dimensions(first)
            .with_context(|| format!("Failed to read frame {}", first.display()))?;

        tracing::info!(frames = frames.len(), width, height, "loaded image sequence from {}", path.display());

        Ok(Self {
            path,
            frames,
            current_frame: 0,
            width,
            height,
            frame_interval: fps.filter(|f| *f > 0.0).map(|f| Duration::from_secs_f32(1.0 / f)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn total_frames(&self) -> usize {
        self.frames.len()
    }

    pub fn progress(&self) -> f32 {
        if self.frames.is_empty() {
            0.0
        } else {
            self.current_frame as f32 / self.frames.len() as f32
        }
    }
}

impl FrameSource for ImageSequence {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let Some(frame_path) = self.frames.get(self.current_frame) else {
            return Ok(None);
        };
        if let Some(interval) = self.frame_interval {
            std::thread::sleep(interval);
        }

        let img = image::open(frame_path)
            .with_context(|| format!("Failed to load frame {}", frame_path.display()))?;
        let frame = Frame {
            index: self.current_frame as u64,
            width: img.width(),
            height: img.height(),
            image: Some(Arc::new(img)),
        };
        self.current_frame += 1;
        Ok(Some(frame))
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Image-less frames at a fixed size, for replaying recorded landmarks.
pub struct BlankClock {
    width: u32,
    height: u32,
    total: Option<u64>,
    next: u64,
    frame_interval: Option<Duration>,
}

impl BlankClock {
    /// `total` of `None` ticks forever.
    pub fn new(width: u32, height: u32, total: Option<u64>, fps: Option<f32>) -> Self {
        Self {
            width,
            height,
            total,
            next: 0,
            frame_interval: fps.filter(|f| *f > 0.0).map(|f| Duration::from_secs_f32(1.0 / f)),
        }
    }
}

impl FrameSource for BlankClock {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.total.is_some_and(|total| self.next >= total) {
            return Ok(None);
        }
        if let Some(interval) = self.frame_interval {
            std::thread::sleep(interval);
        }
        let frame = Frame {
            index: self.next,
            width: self.width,
            height: self.height,
            image: None,
        };
        self.next += 1;
        Ok(Some(frame))
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Live camera capture.
///
/// The camera is opened and read on its own thread and never leaves it, so
/// the source can move to the capture task whatever the backend allows. The
/// stream is stopped when the source is dropped.
#[cfg(feature = "camera")]
pub struct CameraSource {
    requests: Option<mpsc::Sender<()>>,
    frames: mpsc::Receiver<Result<DynamicImage>>,
    worker: Option<JoinHandle<()>>,
    resolution: (u32, u32),
    next: u64,
}

#[cfg(feature = "camera")]
impl CameraSource {
    pub fn new(index: u32) -> Result<Self> {
        let (request_tx, request_rx) = mpsc::channel();
        let (frame_tx, frame_rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel();

        let worker = std::thread::Builder::new()
            .name("camera".to_string())
            .spawn(move || camera_worker(index, ready_tx, request_rx, frame_tx))
            .context("Failed to start camera thread")?;

        let resolution = ready_rx
            .recv()
            .map_err(|_| anyhow::anyhow!("Camera thread exited during startup"))??;

        Ok(Self {
            requests: Some(request_tx),
            frames: frame_rx,
            worker: Some(worker),
            resolution,
            next: 0,
        })
    }
}

#[cfg(feature = "camera")]
fn open_camera(index: u32) -> Result<nokhwa::Camera> {
    use nokhwa::pixel_format::RgbFormat;
    use nokhwa::utils::{CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType, Resolution};

    tracing::debug!(index, "opening camera");
    let format = CameraFormat::new(Resolution::new(640, 480), FrameFormat::MJPEG, 30);
    let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Exact(format));

    let mut camera = nokhwa::Camera::new(CameraIndex::Index(index), requested)
        .map_err(|e| anyhow::anyhow!("Failed to open camera: {}", e))?;
    camera
        .open_stream()
        .map_err(|e| anyhow::anyhow!("Failed to open camera stream: {}", e))?;
    Ok(camera)
}

#[cfg(feature = "camera")]
fn read_camera_frame(camera: &mut nokhwa::Camera) -> Result<DynamicImage> {
    use nokhwa::pixel_format::RgbFormat;

    let frame = camera
        .frame()
        .map_err(|e| anyhow::anyhow!("Failed to capture frame: {}", e))?;
    let decoded = frame
        .decode_image::<RgbFormat>()
        .map_err(|e| anyhow::anyhow!("Failed to decode frame: {}", e))?;

    // Mirror for a selfie view so left and right match the user's hands
    Ok(DynamicImage::ImageRgb8(decoded).fliph())
}

#[cfg(feature = "camera")]
fn camera_worker(
    index: u32,
    ready: mpsc::Sender<Result<(u32, u32)>>,
    requests: mpsc::Receiver<()>,
    frames: mpsc::Sender<Result<DynamicImage>>,
) {
    let mut camera = match open_camera(index) {
        Ok(camera) => camera,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };
    let resolution = camera.resolution();
    if ready.send(Ok((resolution.width(), resolution.height()))).is_err() {
        let _ = camera.stop_stream();
        return;
    }

    // Runs until the source drops its request sender
    while requests.recv().is_ok() {
        if frames.send(read_camera_frame(&mut camera)).is_err() {
            break;
        }
    }

    let _ = camera.stop_stream();
    tracing::debug!("camera stream stopped");
}

#[cfg(feature = "camera")]
impl FrameSource for CameraSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let requests = self
            .requests
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("Camera is closed"))?;
        requests
            .send(())
            .map_err(|_| anyhow::anyhow!("Camera thread has stopped"))?;
        let image = self
            .frames
            .recv()
            .map_err(|_| anyhow::anyhow!("Camera thread has stopped"))??;

        let frame = Frame {
            index: self.next,
            width: image.width(),
            height: image.height(),
            image: Some(Arc::new(image)),
        };
        self.next += 1;
        Ok(Some(frame))
    }

    fn dimensions(&self) -> (u32, u32) {
        self.resolution
    }

    fn is_live(&self) -> bool {
        true
    }
}

#[cfg(feature = "camera")]
impl Drop for CameraSource {
    fn drop(&mut self) {
        // Closing the request channel ends the worker loop
        self.requests.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
