//! Vertex input layouts
//!
//! A vertex type declares its byte layout once through [`VertexType`]; the
//! pipeline cache builds one graphics pipeline per distinct layout.

use ash::vk;
use bytemuck::{Pod, Zeroable};

/// One attribute within an interleaved vertex
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    /// Shader input location
    pub location: u32,
    /// Attribute format
    pub format: vk::Format,
    /// Byte offset from the start of the vertex
    pub offset: u32,
}

/// Interleaved layout of a single vertex binding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexLayout {
    /// Bytes between consecutive vertices
    pub stride: u32,
    /// Attributes in location order
    pub attributes: &'static [VertexAttribute],
}

impl VertexLayout {
    /// Binding description for binding 0
    pub const fn binding_description(&self) -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: self.stride,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    /// Attribute descriptions for binding 0
    pub fn attribute_descriptions(&self) -> Vec<vk::VertexInputAttributeDescription> {
        self.attributes
            .iter()
            .map(|attr| vk::VertexInputAttributeDescription {
                binding: 0,
                location: attr.location,
                format: attr.format,
                offset: attr.offset,
            })
            .collect()
    }
}

/// A plain-old-data vertex with a fixed byte layout
pub trait VertexType: Pod {
    /// Layout shared by every vertex of this type
    const LAYOUT: VertexLayout;
}

/// Position, color and texture coordinate
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct Vertex {
    /// Object-space position
    pub position: [f32; 3],
    /// Vertex color, multiplied with the texture
    pub color: [f32; 3],
    /// Texture coordinate
    pub tex_coord: [f32; 2],
}

impl Vertex {
    /// Create a new vertex
    pub const fn new(position: [f32; 3], color: [f32; 3], tex_coord: [f32; 2]) -> Self {
        Self {
            position,
            color,
            tex_coord,
        }
    }
}

impl VertexType for Vertex {
    const LAYOUT: VertexLayout = VertexLayout {
        stride: std::mem::size_of::<Self>() as u32,
        attributes: &[
            VertexAttribute {
                location: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: 0,
            },
            VertexAttribute {
                location: 1,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: 12,
            },
            VertexAttribute {
                location: 2,
                format: vk::Format::R32G32_SFLOAT,
                offset: 24,
            },
        ],
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_layout_matches_struct() {
        assert_eq!(Vertex::LAYOUT.stride, 32);
        assert_eq!(
            Vertex::LAYOUT.attributes[1].offset as usize,
            std::mem::offset_of!(Vertex, color)
        );
        assert_eq!(
            Vertex::LAYOUT.attributes[2].offset as usize,
            std::mem::offset_of!(Vertex, tex_coord)
        );
    }

    #[test]
    fn test_attribute_descriptions_use_binding_zero() {
        let descriptions = Vertex::LAYOUT.attribute_descriptions();
        assert_eq!(descriptions.len(), 3);
        assert!(descriptions.iter().all(|d| d.binding == 0));
        assert_eq!(Vertex::LAYOUT.binding_description().stride, 32);
    }
}
