//! # Camera Client
//!
//! Consumes the robot's video streams. Each camera has its own TCP stream and its own task,
//! which reads length framed compressed images, decodes them and keeps the latest frame.
//!
//! Until the first frame of a camera arrives its getters return a placeholder frame.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::eqpt::cam::{read_video_frame, CamId, CamImage, FrameDecoder, VideoFrameError};
use log::{debug, info, warn};
use std::{
    io::ErrorKind,
    net::{Shutdown, SocketAddr, TcpStream},
    sync::{Mutex, MutexGuard},
    time::Duration,
};

use crate::task::TaskMonitor;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Latest decoded frame of each camera, each behind its own lock.
#[derive(Debug, Default)]
pub struct CamFrames {
    rgb: Mutex<Option<CamImage>>,
    depth: Mutex<Option<CamImage>>,
}

/// Connection to one camera's video stream.
#[derive(Debug)]
pub struct CamClient {
    cam: CamId,
    stream: TcpStream,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum CamClientError {
    #[error("Could not connect to the {0:?} camera stream: {1}")]
    ConnectError(CamId, std::io::Error),

    #[error("Could not configure the {0:?} camera stream: {1}")]
    SocketConfigError(CamId, std::io::Error),

    #[error("Error on the {0:?} camera stream: {1}")]
    StreamError(CamId, VideoFrameError),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl CamFrames {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest frame of the camera, or the placeholder if none has arrived.
    pub fn get(&self, cam: CamId) -> CamImage {
        self.slot(cam).clone().unwrap_or_else(CamImage::placeholder)
    }

    /// `true` if a real frame has arrived from the camera.
    pub fn has_frame(&self, cam: CamId) -> bool {
        self.slot(cam).is_some()
    }

    pub fn set(&self, cam: CamId, image: CamImage) {
        *self.slot(cam) = Some(image);
    }

    /// Forget all frames.
    pub fn clear(&self) {
        *self.slot(CamId::Rgb) = None;
        *self.slot(CamId::Depth) = None;
    }

    fn slot(&self, cam: CamId) -> MutexGuard<Option<CamImage>> {
        let m = match cam {
            CamId::Rgb => &self.rgb,
            CamId::Depth => &self.depth,
        };
        match m.lock() {
            Ok(g) => g,
            Err(e) => e.into_inner(),
        }
    }
}

impl CamClient {
    /// Connect to a camera's video stream.
    pub fn connect(
        cam: CamId,
        address: &SocketAddr,
        timeout: Duration,
    ) -> Result<Self, CamClientError> {
        let stream = TcpStream::connect_timeout(address, timeout)
            .map_err(|e| CamClientError::ConnectError(cam, e))?;
        stream
            .set_nodelay(true)
            .map_err(|e| CamClientError::SocketConfigError(cam, e))?;

        info!("Connected to {:?} camera stream at {}", cam, address);

        Ok(Self { cam, stream })
    }

    pub fn cam(&self) -> CamId {
        self.cam
    }

    /// A handle which can be used to shut the stream down from another thread, unblocking the
    /// consumer.
    pub fn shutdown_handle(&self) -> Result<TcpStream, CamClientError> {
        self.stream
            .try_clone()
            .map_err(|e| CamClientError::SocketConfigError(self.cam, e))
    }

    /// Consumer task body. Reads and decodes frames until the stream ends or the monitor stops.
    ///
    /// Frames which fail to decode are skipped.
    pub fn run(
        mut self,
        decoder: &dyn FrameDecoder,
        frames: &CamFrames,
        monitor: &TaskMonitor,
    ) -> Result<(), CamClientError> {
        let mut num_frames = 0u64;

        while monitor.is_alive() {
            let data = match read_video_frame(&mut self.stream) {
                Ok(d) => d,
                // Shutdown from our side or the remote closed the stream
                Err(VideoFrameError::Io(e))
                    if !monitor.is_alive() || e.kind() == ErrorKind::UnexpectedEof =>
                {
                    debug!("{:?} camera stream closed: {}", self.cam, e);
                    break;
                }
                Err(e) => return Err(CamClientError::StreamError(self.cam, e)),
            };

            match decoder.decode(self.cam, &data) {
                Ok(image) => {
                    frames.set(self.cam, image);
                    num_frames += 1;
                }
                Err(e) => warn!("Dropping {:?} camera frame: {}", self.cam, e),
            }
        }

        self.stream.shutdown(Shutdown::Both).ok();
        info!(
            "{:?} camera consumer stopped after {} frames",
            self.cam, num_frames
        );

        Ok(())
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use chrono::Utc;
    use comms_if::eqpt::cam::{write_video_frame, PLACEHOLDER_RGB, PLACEHOLDER_WIDTH};
    use std::{net::TcpListener, sync::Arc, thread};

    /// Makes a 1x1 grey image from the first byte of the frame, fails on empty frames.
    struct ByteDecoder;

    impl FrameDecoder for ByteDecoder {
        fn decode(&self, _cam: CamId, data: &[u8]) -> Result<CamImage, VideoFrameError> {
            match data.first() {
                Some(b) => Ok(CamImage::from_luma(Utc::now(), 1, 1, &[*b])),
                None => Err(VideoFrameError::Decode("empty".into())),
            }
        }
    }

    #[test]
    fn test_placeholder_until_first_frame() {
        let frames = CamFrames::new();
        let img = frames.get(CamId::Depth);

        assert!(!frames.has_frame(CamId::Depth));
        assert_eq!(img.width, PLACEHOLDER_WIDTH);
        assert_eq!(&img.data[0..3], &PLACEHOLDER_RGB);

        frames.set(CamId::Depth, CamImage::from_luma(Utc::now(), 1, 1, &[7]));
        assert_eq!(frames.get(CamId::Depth).data, vec![7, 7, 7]);

        // Cameras are independent
        assert!(!frames.has_frame(CamId::Rgb));

        frames.clear();
        assert!(!frames.has_frame(CamId::Depth));
    }

    #[test]
    fn test_consume_stream() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let server = thread::spawn(move || {
            let (mut s, _) = listener.accept().unwrap();
            write_video_frame(&mut s, &[10]).unwrap();
            // Undecodable, skipped
            write_video_frame(&mut s, &[]).unwrap();
            write_video_frame(&mut s, &[42, 1, 2]).unwrap();
        });

        let monitor = Arc::new(TaskMonitor::new());
        monitor.start();
        let frames = CamFrames::new();

        let client = CamClient::connect(CamId::Rgb, &addr, Duration::from_secs(1)).unwrap();
        server.join().unwrap();

        // Server has closed the stream, so this returns once all frames are read
        client.run(&ByteDecoder, &frames, &monitor).unwrap();

        assert_eq!(frames.get(CamId::Rgb).data, vec![42, 42, 42]);
        assert!(!frames.has_frame(CamId::Depth));
    }

    #[test]
    fn test_connect_refused() {
        // Bind then drop to get a port nothing is listening on
        let addr = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap();

        match CamClient::connect(CamId::Depth, &addr, Duration::from_millis(200)) {
            Err(CamClientError::ConnectError(CamId::Depth, _)) => (),
            r => panic!("Unexpected result {:?}", r),
        }
    }
}
