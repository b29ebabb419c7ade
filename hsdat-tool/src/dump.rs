use std::path::Path;

use anyhow::{Context, Result};
use hsdat_core::moveset::DEFAULT_SUBROUTINE_DEPTH;
use hsdat_core::script::iter_script;
use hsdat_core::{DatFile, Event, MovesetDatFile, StructView, SubactionEntry};
use itertools::Itertools;
use serde::Serialize;

fn hex_offset(offset: usize) -> String {
    format!("0x{:X}", offset)
}

#[derive(Debug, Serialize)]
pub struct Field {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Serialize)]
pub struct EventDump {
    pub offset: String,
    pub name: String,
    pub code: String,
    pub fields: Vec<Field>,
    pub raw: String,
}

impl EventDump {
    fn new(offset: usize, event: &Event) -> Result<Self> {
        let fields = event
            .field_names()
            .zip(event.values()?)
            .map(|(name, value)| Field {
                name: name.to_string(),
                value: value.to_string(),
            })
            .collect();
        Ok(Self {
            offset: hex_offset(offset),
            name: event.name().to_string(),
            code: format!("0x{:02X}", event.code()),
            fields,
            raw: hex::encode_upper(event.as_bytes()),
        })
    }
}

#[derive(Debug, Serialize)]
pub struct ScriptDump {
    pub name: String,
    pub offset: String,
    pub events: Vec<EventDump>,
}

impl ScriptDump {
    fn new(name: String, start: usize, script: &[Event]) -> Result<Self> {
        let events = iter_script(script, start)
            .map(|(offset, event)| EventDump::new(offset, event))
            .collect::<Result<_>>()?;
        Ok(Self {
            name,
            offset: hex_offset(start),
            events,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct ScriptsFile {
    pub subactions: Vec<ScriptDump>,
    pub subroutines: Vec<ScriptDump>,
    pub articles: Vec<ScriptDump>,
}

#[derive(Debug, Serialize)]
pub struct SubactionDump {
    pub id: String,
    pub name: String,
    #[serde(flatten)]
    pub entry: SubactionEntry,
}

#[derive(Debug, Serialize)]
pub struct AlignmentDump {
    pub target: String,
    pub alignment: usize,
}

#[derive(Debug, Serialize)]
pub struct ArticleDump {
    pub name: String,
    pub offset: String,
    pub variants: usize,
    pub attributes: Vec<Field>,
}

#[derive(Debug, Serialize)]
pub struct Summary {
    pub character: String,
    pub subactions: Vec<SubactionDump>,
    pub common_attributes: Vec<Field>,
    pub unique_attributes: Vec<Field>,
    pub articles: Vec<ArticleDump>,
    pub alignment: Vec<AlignmentDump>,
}

fn attribute_fields(dat: &DatFile, view: StructView) -> Result<Vec<Field>> {
    let layout = view.layout(dat)?;
    Ok(layout
        .field_names()
        .zip(view.get(dat)?)
        .map(|(name, value)| Field {
            name: name.to_string(),
            value: value.to_string(),
        })
        .collect())
}

pub fn scripts(m: &MovesetDatFile) -> Result<ScriptsFile> {
    let mut subactions = Vec::new();
    for (id, entry) in m.iter_subactions()? {
        if entry.script_pointer == 0 {
            continue;
        }
        let start = DatFile::pointer(entry.script_pointer);
        let name = format!("0x{:03X} {}", id, m.subaction_short_name(id)?);
        subactions.push(ScriptDump::new(name, start, &m.subaction_script(id)?)?);
    }

    let subroutines = m
        .find_subroutines(DEFAULT_SUBROUTINE_DEPTH)?
        .into_iter()
        .map(|start| ScriptDump::new(format!("sub_{:X}", start), start, &m.script_at(start)?))
        .collect::<Result<_>>()?;

    let mut articles = Vec::new();
    for (i, article) in m.articles().iter().enumerate() {
        for variant in 0..article.variant_count(m.dat())? {
            let Some(script) = m.article_script(i, variant)? else {
                continue;
            };
            let start = article
                .variants()
                .map(|t| t.get_field(m.dat(), variant, "script_pointer"))
                .transpose()?
                .and_then(|v| v.as_u32())
                .map_or(0, DatFile::pointer);
            let variant_name = article
                .variant_names
                .get(variant)
                .cloned()
                .unwrap_or_else(|| variant.to_string());
            articles.push(ScriptDump::new(format!("{}/{}", article.name, variant_name), start, &script)?);
        }
    }

    Ok(ScriptsFile {
        subactions,
        subroutines,
        articles,
    })
}

pub fn summary(m: &MovesetDatFile) -> Result<Summary> {
    let dat = m.dat();
    let subactions = m
        .iter_subactions()?
        .into_iter()
        .map(|(id, entry)| {
            Ok(SubactionDump {
                id: format!("0x{:X}", id),
                name: m.subaction_name(id)?,
                entry,
            })
        })
        .collect::<Result<_>>()?;

    let articles = m
        .articles()
        .iter()
        .map(|a| {
            Ok(ArticleDump {
                name: a.name.clone(),
                offset: hex_offset(a.offset(dat)?),
                variants: a.variant_count(dat)?,
                attributes: match a.attributes() {
                    Some(view) => attribute_fields(dat, view)?,
                    None => Vec::new(),
                },
            })
        })
        .collect::<Result<_>>()?;

    Ok(Summary {
        character: m.character().to_string(),
        subactions,
        common_attributes: attribute_fields(dat, m.common_attributes())?,
        unique_attributes: attribute_fields(dat, m.unique_attributes())?,
        articles,
        alignment: dat
            .alignment()
            .entries()
            .iter()
            .map(|c| AlignmentDump {
                target: hex_offset(c.target),
                alignment: c.alignment,
            })
            .collect(),
    })
}

/// Writes `scripts.yaml` and `summary.yaml` into `output`.
pub fn write_dump(m: &MovesetDatFile, output: &Path) -> Result<()> {
    std::fs::create_dir_all(output).with_context(|| format!("creating {}", output.display()))?;

    let scripts_path = output.join("scripts.yaml");
    let mut writer = std::fs::File::create(&scripts_path)?;
    serde_yaml::to_writer(&mut writer, &scripts(m)?)?;

    let summary_path = output.join("summary.yaml");
    let mut writer = std::fs::File::create(&summary_path)?;
    serde_yaml::to_writer(&mut writer, &summary(m)?)?;

    log::info!("wrote {} and {}", scripts_path.display(), summary_path.display());
    Ok(())
}

#[derive(Debug, Serialize)]
pub struct NodeDump {
    pub name: String,
    pub offset: String,
}

#[derive(Debug, Serialize)]
pub struct ContainerInfo {
    pub file_size: u32,
    pub data_size: u32,
    pub pointer_count: u32,
    pub root_nodes: Vec<NodeDump>,
    pub ref_count: u32,
    pub problems: Option<String>,
}

pub fn container_info(dat: &DatFile) -> Result<ContainerInfo> {
    let root_nodes = (0..dat.root_count()? as usize)
        .map(|i| {
            let pointer = dat.root_nodes().get_field(dat, i, "pointer")?.as_u32().unwrap_or(0);
            Ok(NodeDump {
                name: dat.title(i)?,
                offset: hex_offset(DatFile::pointer(pointer)),
            })
        })
        .collect::<Result<_>>()?;
    Ok(ContainerInfo {
        file_size: dat.file_size()?,
        data_size: dat.data_size()?,
        pointer_count: dat.pointer_count()?,
        root_nodes,
        ref_count: dat.ref_count()?,
        problems: dat.check_invariants().err().map(|e| e.to_string()),
    })
}

/// One line per root node, for log output.
pub fn root_names(info: &ContainerInfo) -> String {
    info.root_nodes.iter().map(|n| n.name.as_str()).join(", ")
}
