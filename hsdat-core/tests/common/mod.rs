#![allow(dead_code)]

use std::collections::BTreeMap;

use hsdat_core::attributes::{ArticleInfo, AttributeEntry, AttributeSource, TableSchema};
use hsdat_core::{DatBuilder, EventSchema, EventSchemas, Result};

pub const EVENTS: &str = r#"
0x00: { name: End of Script, length: 4 }
0x04:
  name: Synchronous Timer
  length: 4
  fields: [{ name: Frames, bits: [6, 31], type: u }]
0x14:
  name: Subroutine
  length: 8
  pointer: 4
  fields: [{ name: Target, bits: [32, 63], type: h }]
0x18: { name: Return, length: 4 }
0x1C:
  name: Goto
  length: 8
  pointer: 4
  fields: [{ name: Target, bits: [32, 63], type: h }]
"#;

pub fn schemas() -> EventSchemas {
    EventSchemas::shared(EventSchema::from_yaml_str(EVENTS).unwrap())
}

pub fn hex_bytes(s: &str) -> Vec<u8> {
    hex::decode(s.replace(' ', "")).unwrap()
}

/// Data-section offsets inside the moveset fixture.
pub mod layout {
    pub const INDEX: usize = 0x000;
    pub const COMMON: usize = 0x060;
    pub const UNIQUE: usize = 0x070;
    pub const SUBACTIONS: usize = 0x078;
    pub const NONLOCAL: usize = 0x0A8;
    pub const CHAIN: usize = 0x0C0;
    pub const HURTBOX_HEADER: usize = 0x0CC;
    pub const HURTBOXES: usize = 0x0D4;
    pub const LEDGE_GRAB: usize = 0x0FC;
    pub const SCRIPT0: usize = 0x118;
    pub const SCRIPT1: usize = 0x128;
    pub const SCRIPT_NONLOCAL: usize = 0x130;
    pub const SUB_A: usize = 0x140;
    pub const SUB_B: usize = 0x150;
    pub const NAME0: usize = 0x160;
    pub const NAME1: usize = 0x180;
    pub const NAME_NONLOCAL: usize = 0x1A0;
    pub const JOINT: usize = 0x1C0;
    pub const DISPLAY: usize = 0x200;
    pub const MATERIAL: usize = 0x210;
    pub const TEXTURE: usize = 0x228;
    pub const IMAGE_HEADER: usize = 0x284;
    pub const IMAGE: usize = 0x2A0;
    pub const ARTICLE_LIST: usize = 0x2C0;
    pub const ARTICLE: usize = 0x2C4;
    pub const ARTICLE_HEADER: usize = 0x2DC;
    pub const ARTICLE_ATTRIBUTES: usize = 0x360;
    pub const ARTICLE_VARIANTS: usize = 0x370;
    pub const ARTICLE_SCRIPT: usize = 0x390;
    pub const END: usize = 0x398;
}

pub struct Fixture {
    pub with_model: bool,
    pub with_articles: bool,
    pub character: &'static str,
}

impl Default for Fixture {
    fn default() -> Self {
        Self {
            with_model: true,
            with_articles: true,
            character: "Foo",
        }
    }
}

fn subaction(b: &mut DatBuilder, row: usize, name: usize, script: usize) {
    b.put_pointer(row, name)
        .put_u32(row + 0x4, 0x1000)
        .put_u32(row + 0x8, 0x200)
        .put_pointer(row + 0xC, script)
        .put_u32(row + 0x10, 1);
}

fn cstr(b: &mut DatBuilder, at: usize, s: &str) {
    let mut bytes = s.as_bytes().to_vec();
    bytes.push(0);
    b.put_bytes(at, &bytes);
}

/// A small fighter moveset: two local subactions, one nonlocal, a hurtbox,
/// a subroutine chain, a textured model and one article.
pub fn moveset(f: &Fixture) -> Vec<u8> {
    use layout::*;
    let mut b = DatBuilder::new(END);

    b.put_pointer(INDEX, COMMON)
        .put_pointer(INDEX + 0x04, UNIQUE)
        .put_pointer(INDEX + 0x0C, SUBACTIONS)
        .put_pointer(INDEX + 0x14, NONLOCAL)
        .put_pointer(INDEX + 0x1C, CHAIN)
        .put_pointer(INDEX + 0x30, HURTBOX_HEADER)
        .put_pointer(INDEX + 0x44, LEDGE_GRAB);
    if f.with_articles {
        b.put_pointer(INDEX + 0x48, ARTICLE_LIST);
    }
    if f.with_model {
        b.put_pointer(INDEX + 0x5C, JOINT);
    }

    for (i, v) in [1.0f32, 2.0, 3.0, 4.0].iter().enumerate() {
        b.put_f32(COMMON + 4 * i, *v);
    }
    b.put_f32(UNIQUE, 10.0).put_f32(UNIQUE + 4, 20.0);

    subaction(&mut b, SUBACTIONS, NAME0, SCRIPT0);
    subaction(&mut b, SUBACTIONS + 0x18, NAME1, SCRIPT1);
    subaction(&mut b, NONLOCAL, NAME_NONLOCAL, SCRIPT_NONLOCAL);

    b.put_pointer(CHAIN, CHAIN + 4).put_pointer(CHAIN + 8, NONLOCAL + 0x18);

    b.put_u32(HURTBOX_HEADER, 1).put_pointer(HURTBOX_HEADER + 4, HURTBOXES);
    b.put_u32(HURTBOXES, 5).put_f32(HURTBOXES + 0x24, 1.5);
    b.put_u32(LEDGE_GRAB, 7).put_f32(LEDGE_GRAB + 0x10, 0.5);

    // subaction 0: subroutine call, terminator (12 bytes)
    b.put_bytes(SCRIPT0, &hex_bytes("14000000")).put_pointer(SCRIPT0 + 4, SUB_A);
    // subaction 1: timer 10, terminator
    b.put_bytes(SCRIPT1, &hex_bytes("0400000A"));
    // nonlocal: return
    b.put_bytes(SCRIPT_NONLOCAL, &hex_bytes("18000000"));
    // A: goto B
    b.put_bytes(SUB_A, &hex_bytes("1C000000")).put_pointer(SUB_A + 4, SUB_B);
    // B: timer 1, return
    b.put_bytes(SUB_B, &hex_bytes("04000001 18000000"));

    cstr(&mut b, NAME0, "PlyFoo_ACTION_Wait1_figatree");
    cstr(&mut b, NAME1, "PlyFoo_ACTION_Walk_figatree");
    cstr(&mut b, NAME_NONLOCAL, "PlyFoo_ACTION_Swim_figatree");

    b.put_pointer(JOINT + 0x10, DISPLAY)
        .put_pointer(DISPLAY + 0x8, MATERIAL)
        .put_pointer(MATERIAL + 0x8, TEXTURE)
        .put_pointer(TEXTURE + 0x4C, IMAGE_HEADER)
        .put_pointer(IMAGE_HEADER, IMAGE)
        .put_u32(IMAGE_HEADER + 4, 0x0020_0020)
        .put_u32(IMAGE_HEADER + 8, 0xE);
    for pad in (IMAGE_HEADER + 0xC..IMAGE).step_by(4) {
        b.put_u32(pad, 0xDEAD_BEEF);
    }
    b.put_bytes(IMAGE, &[0x11; 0x20]);

    b.put_pointer(ARTICLE_LIST, ARTICLE)
        .put_pointer(ARTICLE, ARTICLE_HEADER)
        .put_pointer(ARTICLE + 0x4, ARTICLE_ATTRIBUTES)
        .put_pointer(ARTICLE + 0xC, ARTICLE_VARIANTS);
    b.put_f32(ARTICLE_HEADER, 9.0);
    b.put_f32(ARTICLE_ATTRIBUTES, 100.0).put_f32(ARTICLE_ATTRIBUTES + 4, 0.25);
    b.put_pointer(ARTICLE_VARIANTS + 0xC, ARTICLE_SCRIPT);
    b.put_bytes(ARTICLE_SCRIPT, &hex_bytes("04000003"));

    b.root(INDEX, &format!("ftData{}", f.character));
    b.build()
}

/// Attribute layouts supplied in code.
pub struct TestAttributes;

impl AttributeSource for TestAttributes {
    fn common_table(&self, _kind: &str) -> Result<Option<TableSchema>> {
        let mut entries = BTreeMap::new();
        entries.insert(
            0,
            AttributeEntry {
                name: "Walk Speed".to_string(),
                ty: 'f',
            },
        );
        TableSchema::from_entries(&entries, 0x10).map(Some)
    }

    fn unique_table(&self, _character: &str) -> Result<Option<TableSchema>> {
        Ok(None)
    }

    fn article_info(&self, _character: &str) -> Result<Vec<ArticleInfo>> {
        let mut attributes = BTreeMap::new();
        attributes.insert(
            0,
            AttributeEntry {
                name: "Speed".to_string(),
                ty: 'f',
            },
        );
        Ok(vec![ArticleInfo {
            name: "Pellet".to_string(),
            variants: vec!["Normal".to_string(), "Charged".to_string()],
            attributes,
        }])
    }
}
