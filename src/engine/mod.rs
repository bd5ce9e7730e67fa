//! ### English
//! Relay internals: backend seam, surfaces, frame source, and the render-thread runtime.
//!
//! ### 中文
//! 中继内部模块：后端接口、渲染表面、帧源以及渲染线程运行时。

pub mod backend;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod rendering;
pub mod runtime;
