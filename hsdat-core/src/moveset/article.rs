//! Articles: projectiles and other objects a character spawns, each with its
//! own attributes, script variants and model.

use std::rc::Rc;

use crate::attributes::{ArticleInfo, TableSchema};
use crate::dat::DatFile;
use crate::error::Result;
use crate::layout::{Record, RecordLayout};
use crate::moveset::register_images;
use crate::scene::SceneGraph;
use crate::script::{read_script, EventSchema, Script};
use crate::view::{StructView, TableView};

const DATA_FORMAT: &str = ">IIIIII";
const DATA_NAMES: [&str; 6] = [
    "header_pointer",
    "attributes_pointer",
    "hurtbox_header_pointer",
    "variants_pointer",
    "joint_pointer_pointer",
    "unknown_0x14",
];
const HEADER_WORDS: usize = 0x21;
const VARIANT_FORMAT: &str = ">IIII";
const VARIANT_NAMES: [&str; 4] = ["unknown_0x0", "unknown_0x4", "unknown_0x8", "script_pointer"];
const VARIANT_SIZE: usize = 0x10;

#[derive(Debug, Clone)]
pub struct Article {
    pub name: String,
    pub variant_names: Vec<String>,
    data: StructView,
    header: Option<StructView>,
    attributes: Option<StructView>,
    variants: Option<TableView>,
    images: Vec<StructView>,
}

fn word(record: &Record, i: usize) -> u32 {
    record[i].as_u32().unwrap_or(0)
}

impl Article {
    /// Reads the article whose data record is at absolute `offset`. Tables
    /// without a documented length end at the next pointer target.
    pub(crate) fn parse(dat: &mut DatFile, offset: usize, info: &ArticleInfo) -> Result<Self> {
        let data = dat.register_struct(offset, Rc::new(RecordLayout::parse(DATA_FORMAT, &DATA_NAMES)?));
        let record = data.get(dat)?;

        let header = match word(&record, 0) {
            0 => None,
            p => {
                let layout = RecordLayout::anonymous(&format!(">{}f", HEADER_WORDS))?;
                Some(dat.register_struct(DatFile::pointer(p), Rc::new(layout)))
            }
        };

        let attributes = match word(&record, 1) {
            0 => None,
            p => {
                let start = DatFile::pointer(p);
                let size = dat.next_target(start)?.map_or(0, |end| end - start);
                let schema = TableSchema::from_entries(&info.attributes, size)?;
                Some(dat.register_struct(start, Rc::new(schema.layout()?)))
            }
        };

        let variants = match word(&record, 3) {
            0 => None,
            p => {
                let start = DatFile::pointer(p);
                let end = dat.next_target(start)?.unwrap_or(start);
                let layout = Rc::new(RecordLayout::parse(VARIANT_FORMAT, &VARIANT_NAMES)?);
                Some(dat.register_table(start, (end - start) / VARIANT_SIZE, layout))
            }
        };

        let mut images = Vec::new();
        if let p @ 1.. = word(&record, 4) {
            let root = dat.read_u32(DatFile::pointer(p))?;
            if root != 0 {
                let offsets = SceneGraph::walk(dat, DatFile::pointer(root))?.image_offsets;
                images = register_images(dat, &offsets)?;
            }
        }

        log::debug!("article '{}' at 0x{:X}: {} images", info.name, offset, images.len());
        Ok(Self {
            name: info.name.clone(),
            variant_names: info.variants.clone(),
            data,
            header,
            attributes,
            variants,
            images,
        })
    }

    /// Current offset of the article's data record.
    pub fn offset(&self, dat: &DatFile) -> Result<usize> {
        self.data.start(dat)
    }

    pub fn data(&self) -> StructView {
        self.data
    }

    pub fn header(&self) -> Option<StructView> {
        self.header
    }

    pub fn attributes(&self) -> Option<StructView> {
        self.attributes
    }

    pub fn variants(&self) -> Option<TableView> {
        self.variants
    }

    pub fn variant_count(&self, dat: &DatFile) -> Result<usize> {
        match self.variants {
            Some(t) => t.len(dat),
            None => Ok(0),
        }
    }

    pub fn image_offsets(&self, dat: &DatFile) -> Result<Vec<usize>> {
        self.images.iter().map(|image| image.start(dat)).collect()
    }

    /// Script of variant `index`, or `None` when the variant has no script.
    pub fn script(&self, dat: &DatFile, schema: &EventSchema, index: usize) -> Result<Option<Script>> {
        let Some(variants) = self.variants else {
            return Ok(None);
        };
        let pointer = variants.get_field(dat, index, "script_pointer")?.as_u32().unwrap_or(0);
        if pointer == 0 {
            return Ok(None);
        }
        read_script(schema, dat.as_bytes(), DatFile::pointer(pointer), true).map(Some)
    }
}
