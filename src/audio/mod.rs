// Audio module - click synthesis, sample-accurate click rendering and live duplex I/O

pub mod click;
pub mod renderer;

cfg_if::cfg_if! {
    if #[cfg(not(target_os = "android"))] {
        pub mod engine_cpal;
        pub use engine_cpal::DuplexEngine;
    }
}

// Re-export commonly used types for convenience
pub use click::{
    generate_click, seconds_to_frame, ClickSamples, ACCENT_FREQUENCY_HZ, CLICK_DURATION_S,
    REGULAR_FREQUENCY_HZ,
};
pub use renderer::ClickRenderer;
