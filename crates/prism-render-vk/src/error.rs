// SPDX-License-Identifier: CEPL-1.0
//! Failure taxonomy for the Vulkan backend.
//!
//! Construction-time variants are fatal and travel up to process exit.
//! [`PresentError::Stale`] and [`ChainError::ZeroExtent`] are the two
//! conditions the frame loop absorbs on its own.

use ash::vk;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VkError {
    #[error("no Vulkan-compatible GPU found")]
    NoCompatibleDevice,

    #[error("no suitable GPU found ({rejected} candidate(s) rejected)")]
    NoSuitableDevice { rejected: usize },

    #[error("validation layer {0} is not available")]
    MissingValidationLayer(String),

    #[error("instance extension {0} is not available")]
    MissingInstanceExtension(String),

    #[error("instance creation failed: {0}")]
    InstanceCreation(vk::Result),

    #[error("surface creation failed: {0}")]
    SurfaceCreation(String),

    #[error("logical device creation failed: {0}")]
    DeviceCreation(vk::Result),

    #[error("presentation chain creation failed: {0}")]
    ChainCreation(#[from] ChainError),

    #[error("pipeline creation failed: {0}")]
    PipelineCreation(String),

    #[error("frame synchronization failed in {step}: {result}")]
    FrameSync {
        step: &'static str,
        result: vk::Result,
    },

    #[error("queue submission failed: {0}")]
    Submit(vk::Result),

    #[error("{0}")]
    Present(#[from] PresentError),

    #[error("Vulkan query {step} failed: {result}")]
    Query {
        step: &'static str,
        result: vk::Result,
    },
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ChainError {
    /// The surface currently has no drawable area (minimized window).
    #[error("surface extent is zero")]
    ZeroExtent,

    #[error("surface reports no formats")]
    NoSurfaceFormats,

    #[error("{step}: {result}")]
    Vulkan {
        step: &'static str,
        result: vk::Result,
    },
}

impl ChainError {
    pub fn vulkan(step: &'static str) -> impl FnOnce(vk::Result) -> ChainError {
        move |result| ChainError::Vulkan { step, result }
    }

    pub fn is_recoverable(&self) -> bool {
        matches!(self, ChainError::ZeroExtent)
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PresentError {
    /// Out of date or suboptimal: rebuild the chain and carry on.
    #[error("presentation chain is stale ({0})")]
    Stale(vk::Result),

    #[error("{step} failed: {result}")]
    Fatal {
        step: &'static str,
        result: vk::Result,
    },
}

impl PresentError {
    /// Sort a non-success acquire/present code into stale or fatal. An
    /// acquire that times out is handled like an out-of-date chain.
    pub fn classify(step: &'static str, result: vk::Result) -> PresentError {
        match result {
            vk::Result::ERROR_OUT_OF_DATE_KHR
            | vk::Result::SUBOPTIMAL_KHR
            | vk::Result::TIMEOUT
            | vk::Result::NOT_READY => PresentError::Stale(result),
            _ => PresentError::Fatal { step, result },
        }
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, PresentError::Stale(_))
    }
}

pub fn frame_sync(step: &'static str) -> impl FnOnce(vk::Result) -> VkError {
    move |result| VkError::FrameSync { step, result }
}

pub type RenderResult<T> = std::result::Result<T, VkError>;
