//! Types exchanged with the application
//!
//! Handles are generational: once the resource behind a handle is removed
//! the handle stops resolving, even if its slot is reused.

use std::fmt;

use bytemuck::{Pod, Zeroable};

use crate::foundation::collections::RegistryIndex;

macro_rules! registry_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(pub(crate) RegistryIndex);

        impl $name {
            /// Underlying registry index
            pub const fn index(self) -> RegistryIndex {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }
    };
}

registry_handle!(
    /// Uploaded vertex/index buffer pair
    MeshHandle
);
registry_handle!(
    /// Uploaded sampled texture
    TextureHandle
);
registry_handle!(
    /// Graphics pipeline built for one vertex layout
    PipelineHandle
);

/// Slot in the bindless texture array, passed to shaders via push constants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialIndex(pub u32);

impl MaterialIndex {
    /// Raw array index
    pub const fn get(self) -> u32 {
        self.0
    }
}

/// Per-draw push constant block
///
/// Matches the `layout(push_constant)` block of the forward shaders:
/// a column-major model matrix followed by the material index.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct PushConstants {
    /// Model-to-world transform, column-major
    pub model: [[f32; 4]; 4],
    /// Index into the bindless texture array
    pub material_index: u32,
    /// Pads the block to a 16-byte multiple
    pub padding: [u32; 3],
}

impl PushConstants {
    /// Push constants for one draw
    pub const fn new(model: [[f32; 4]; 4], material: MaterialIndex) -> Self {
        Self {
            model,
            material_index: material.0,
            padding: [0; 3],
        }
    }
}

/// Per-frame camera uniform (set 0, binding 0)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct CameraUniform {
    /// World-to-view transform, column-major
    pub view: [[f32; 4]; 4],
    /// View-to-clip transform, column-major
    pub projection: [[f32; 4]; 4],
}

impl CameraUniform {
    /// Identity view and projection
    pub const IDENTITY: Self = Self {
        view: IDENTITY,
        projection: IDENTITY,
    };
}

impl Default for CameraUniform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Column-major 4x4 identity
pub const IDENTITY: [[f32; 4]; 4] = [
    [1.0, 0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0, 0.0],
    [0.0, 0.0, 1.0, 0.0],
    [0.0, 0.0, 0.0, 1.0],
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_constant_block_size() {
        assert_eq!(std::mem::size_of::<PushConstants>(), 80);
        assert_eq!(std::mem::size_of::<CameraUniform>(), 128);
    }

    #[test]
    fn test_push_constants_carry_material() {
        let push = PushConstants::new(IDENTITY, MaterialIndex(5));
        let bytes = bytemuck::bytes_of(&push);
        assert_eq!(&bytes[64..68], &5u32.to_ne_bytes());
    }
}
