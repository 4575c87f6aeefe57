use std::fmt;

/// Shader pipeline stage, used in compile diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStage::Vertex => f.write_str("vertex"),
            ShaderStage::Fragment => f.write_str("fragment"),
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum PlayerError {
    /// Network or decode failure on the media resource. Terminal for the session.
    #[error("media source failed: {0}")]
    Source(String),

    /// No usable GPU adapter or device. Fatal to the player instance.
    #[error("GPU context unavailable: {0}")]
    ContextCreation(String),

    #[error("error compiling {stage} shader: {log}")]
    ShaderCompile { stage: ShaderStage, log: String },

    #[error("error in program linking: {0}")]
    Link(String),

    /// Decoded frame is not a usable side-by-side packing.
    #[error("invalid packed frame {width}x{height}: need width >= 2 and height >= 1")]
    InvalidFrame { width: u32, height: u32 },

    /// The collaborator has nothing to size with the output surface.
    #[error("no sizing target attached to the output surface")]
    MissingTransform,
}

pub type PlayerResult<T> = Result<T, PlayerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shader_compile_message_names_stage() {
        let err = PlayerError::ShaderCompile {
            stage: ShaderStage::Fragment,
            log: "unexpected token".into(),
        };
        assert_eq!(
            err.to_string(),
            "error compiling fragment shader: unexpected token"
        );
    }

    #[test]
    fn invalid_frame_message() {
        let err = PlayerError::InvalidFrame { width: 1, height: 4 };
        assert!(err.to_string().contains("1x4"));
    }
}
