//! Dynctrl V4L2 - uvcvideo backend for Linux
//!
//! Finds video devices under `/dev`, asks each for its driver with
//! `VIDIOC_QUERYCAP` and registers extension unit controls and mappings
//! through the uvcvideo `UVCIOC_CTRL_ADD`/`UVCIOC_CTRL_MAP` ioctls.

#![cfg(target_os = "linux")]

pub mod backend;
mod ioctl;

pub use backend::{V4l2Backend, V4l2Handle};
