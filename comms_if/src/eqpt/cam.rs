//! # Camera Equipment Communications Module
//!
//! The robot serves each camera on its own stream. Every frame on a video stream is a 4 byte
//! big-endian length followed by that many bytes of compressed image data. Decoding of the
//! compressed data is delegated to a [`FrameDecoder`].

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Largest compressed frame accepted from a video stream.
pub const MAX_FRAME_LEN: usize = 8 * 1024 * 1024;

/// Width of the placeholder frame.
pub const PLACEHOLDER_WIDTH: u32 = 640;

/// Height of the placeholder frame.
pub const PLACEHOLDER_HEIGHT: u32 = 480;

/// Colour of the placeholder frame, RGB.
pub const PLACEHOLDER_RGB: [u8; 3] = [190, 70, 20];

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A decoded camera image held as packed 8 bit RGB.
#[derive(Debug, Clone, PartialEq)]
pub struct CamImage {
    /// UTC timestamp at which the frame was acquired
    pub timestamp: DateTime<Utc>,

    pub width: u32,
    pub height: u32,

    /// Row major RGB pixel data, `width * height * 3` bytes
    pub data: Vec<u8>,
}

/// Frame decoder backed by the `image` crate, format detected from the data.
#[derive(Debug, Default, Copy, Clone)]
pub struct ImageCrateDecoder;

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Cameras available on the robot
#[derive(Debug, Serialize, Deserialize, Copy, Clone, Hash, Eq, PartialEq)]
pub enum CamId {
    /// Colour camera
    Rgb,

    /// Depth camera, delivered as a single channel image
    Depth,
}

#[derive(Debug, thiserror::Error)]
pub enum VideoFrameError {
    #[error("Could not read from the video stream: {0}")]
    Io(std::io::Error),

    #[error("Frame of {0} bytes exceeds the maximum of {} bytes", MAX_FRAME_LEN)]
    FrameTooLarge(usize),

    #[error("Could not decode the frame: {0}")]
    Decode(String),
}

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// Converts compressed frame bytes into a raw image.
pub trait FrameDecoder: Send + Sync {
    /// Decode the given frame data, acquired from the given camera.
    fn decode(&self, cam: CamId, data: &[u8]) -> Result<CamImage, VideoFrameError>;
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl CamImage {
    /// Frame shown before any image has been received.
    pub fn placeholder() -> Self {
        let num_px = (PLACEHOLDER_WIDTH * PLACEHOLDER_HEIGHT) as usize;

        Self {
            timestamp: Utc::now(),
            width: PLACEHOLDER_WIDTH,
            height: PLACEHOLDER_HEIGHT,
            data: PLACEHOLDER_RGB
                .iter()
                .cycle()
                .take(num_px * 3)
                .copied()
                .collect(),
        }
    }

    /// Build an image from single channel data by repeating each value into all three channels.
    pub fn from_luma(timestamp: DateTime<Utc>, width: u32, height: u32, luma: &[u8]) -> Self {
        let mut data = Vec::with_capacity(luma.len() * 3);
        for &l in luma {
            data.extend_from_slice(&[l, l, l]);
        }

        Self {
            timestamp,
            width,
            height,
            data,
        }
    }

    /// Return a copy of the pixel data in BGR channel order.
    pub fn to_bgr(&self) -> Vec<u8> {
        let mut bgr = self.data.clone();
        for px in bgr.chunks_exact_mut(3) {
            px.swap(0, 2);
        }
        bgr
    }
}

impl FrameDecoder for ImageCrateDecoder {
    fn decode(&self, cam: CamId, data: &[u8]) -> Result<CamImage, VideoFrameError> {
        let img = image::load_from_memory(data)
            .map_err(|e| VideoFrameError::Decode(e.to_string()))?;
        let timestamp = Utc::now();

        Ok(match cam {
            CamId::Rgb => {
                let rgb = img.to_rgb8();
                CamImage {
                    timestamp,
                    width: rgb.width(),
                    height: rgb.height(),
                    data: rgb.into_raw(),
                }
            }
            CamId::Depth => {
                let luma = img.to_luma8();
                CamImage::from_luma(timestamp, luma.width(), luma.height(), luma.as_raw())
            }
        })
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Read one length framed payload from a video stream.
pub fn read_video_frame<R: Read>(reader: &mut R) -> Result<Vec<u8>, VideoFrameError> {
    let len = reader
        .read_u32::<BigEndian>()
        .map_err(VideoFrameError::Io)? as usize;

    if len > MAX_FRAME_LEN {
        return Err(VideoFrameError::FrameTooLarge(len));
    }

    let mut data = vec![0u8; len];
    reader.read_exact(&mut data).map_err(VideoFrameError::Io)?;

    Ok(data)
}

/// Write one length framed payload to a video stream.
pub fn write_video_frame<W: Write>(writer: &mut W, data: &[u8]) -> Result<(), VideoFrameError> {
    if data.len() > MAX_FRAME_LEN {
        return Err(VideoFrameError::FrameTooLarge(data.len()));
    }

    writer
        .write_u32::<BigEndian>(data.len() as u32)
        .map_err(VideoFrameError::Io)?;
    writer.write_all(data).map_err(VideoFrameError::Io)
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
