//! Scene-graph walk.
//!
//! Joints link to child and sibling joints and to display objects; display
//! objects chain to siblings and link a material; materials link a texture;
//! textures chain to siblings and link an image header, which points at the
//! image data. The walk visits each node once (the graph can share nodes and,
//! in damaged files, contain cycles) and collects the image data offsets,
//! which the hardware needs 32-byte aligned.

use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use crate::dat::DatFile;
use crate::error::Result;
use crate::layout::RecordLayout;

pub const IMAGE_ALIGNMENT: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Joint,
    Display,
    Material,
    Texture,
    ImageHeader,
}

impl NodeKind {
    fn format(self) -> &'static str {
        match self {
            NodeKind::Joint => ">IIIIIfffffffffII",
            NodeKind::Display => ">IIII",
            NodeKind::Material => ">IIIIII",
            NodeKind::Texture => ">IIIIfffffffffIIBBHIfIIIII",
            NodeKind::ImageHeader => ">IHHI",
        }
    }

    fn field_names(self) -> &'static [&'static str] {
        match self {
            NodeKind::Joint => &[
                "name_pointer",
                "flags",
                "child",
                "next",
                "display",
                "rotation_x",
                "rotation_y",
                "rotation_z",
                "scale_x",
                "scale_y",
                "scale_z",
                "translation_x",
                "translation_y",
                "translation_z",
                "inverse_transform",
                "robj",
            ],
            NodeKind::Display => &["name_pointer", "next", "material", "pobj"],
            NodeKind::Material => &["name_pointer", "render_flags", "texture", "material_color", "render_desc", "pe_desc"],
            NodeKind::Texture => &[
                "name_pointer",
                "next",
                "tex_map_id",
                "coord",
                "rotation_x",
                "rotation_y",
                "rotation_z",
                "scale_x",
                "scale_y",
                "scale_z",
                "translation_x",
                "translation_y",
                "translation_z",
                "wrap_s",
                "wrap_t",
                "repeat_s",
                "repeat_t",
                "padding",
                "flags",
                "blending",
                "mag_filter",
                "image_header",
                "tlut_desc",
                "lod_desc",
                "tev_desc",
            ],
            NodeKind::ImageHeader => &["image_data", "width", "height", "format"],
        }
    }

    /// Pointer fields leading to other nodes, with the kind they lead to.
    fn links(self) -> &'static [(&'static str, NodeKind)] {
        match self {
            NodeKind::Joint => &[
                ("child", NodeKind::Joint),
                ("next", NodeKind::Joint),
                ("display", NodeKind::Display),
            ],
            NodeKind::Display => &[("next", NodeKind::Display), ("material", NodeKind::Material)],
            NodeKind::Material => &[("texture", NodeKind::Texture)],
            NodeKind::Texture => &[("next", NodeKind::Texture), ("image_header", NodeKind::ImageHeader)],
            NodeKind::ImageHeader => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneNode {
    pub kind: NodeKind,
    pub offset: usize,
    /// Arena indices of linked nodes.
    pub links: Vec<usize>,
}

/// Nodes reached from one root, in visit order.
#[derive(Debug, Clone, Default)]
pub struct SceneGraph {
    pub nodes: Vec<SceneNode>,
    pub image_offsets: Vec<usize>,
}

impl SceneGraph {
    /// Walks the graph rooted at the joint at absolute `root`. Null links end
    /// a branch.
    pub fn walk(dat: &DatFile, root: usize) -> Result<Self> {
        let mut layouts: HashMap<NodeKind, Rc<RecordLayout>> = HashMap::new();
        let mut graph = SceneGraph::default();
        let mut visited: HashMap<usize, usize> = HashMap::new();
        let mut queue = VecDeque::new();

        visited.insert(root, 0);
        graph.nodes.push(SceneNode {
            kind: NodeKind::Joint,
            offset: root,
            links: Vec::new(),
        });
        queue.push_back(0usize);

        while let Some(index) = queue.pop_front() {
            let (kind, offset) = (graph.nodes[index].kind, graph.nodes[index].offset);
            let layout = match layouts.get(&kind) {
                Some(l) => l.clone(),
                None => {
                    let l = Rc::new(RecordLayout::parse(kind.format(), kind.field_names())?);
                    layouts.insert(kind, l.clone());
                    l
                }
            };

            if kind == NodeKind::ImageHeader {
                let data = dat.read_u32(offset + layout.offset_of("image_data")?)?;
                if data != 0 {
                    graph.image_offsets.push(DatFile::pointer(data));
                }
                continue;
            }

            for (field, target_kind) in kind.links() {
                let value = dat.read_u32(offset + layout.offset_of(*field)?)?;
                if value == 0 {
                    continue;
                }
                let target = DatFile::pointer(value);
                let target_index = match visited.get(&target) {
                    Some(i) => *i,
                    None => {
                        let i = graph.nodes.len();
                        graph.nodes.push(SceneNode {
                            kind: *target_kind,
                            offset: target,
                            links: Vec::new(),
                        });
                        visited.insert(target, i);
                        queue.push_back(i);
                        i
                    }
                };
                graph.nodes[index].links.push(target_index);
            }
        }

        graph.image_offsets.sort_unstable();
        graph.image_offsets.dedup();
        log::debug!(
            "scene at 0x{:X}: {} nodes, {} images",
            root,
            graph.nodes.len(),
            graph.image_offsets.len()
        );
        Ok(graph)
    }

    pub fn count(&self, kind: NodeKind) -> usize {
        self.nodes.iter().filter(|n| n.kind == kind).count()
    }
}
