use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum VolumeError {
    #[error("scale.{axis} must be non-negative, got {value}")]
    NegativeScale { axis: char, value: f32 },
    #[error("scale.{axis} is not finite")]
    NonFiniteScale { axis: char },
    #[error("position is not finite")]
    NonFinitePosition,
    #[error("rotation must be a finite, non-zero quaternion")]
    InvalidRotation,
    #[error("unknown volume kind tag {0}")]
    UnknownKind(u32),
}
