mod config;
mod dump;

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use hsdat_core::{AttributeSource, DatFile, EventSchemas, FsmDatFile, MovesetDatFile, NoAttributes, YamlAttributes};
use log::LevelFilter;

use crate::config::ToolConfig;

#[derive(Parser, Debug)]
#[command(version, about = "Inspect and dump relocatable .dat containers")]
struct Args {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Root of the attribute schemas
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Fighter event type table (YAML)
    #[arg(long, global = true)]
    events: Option<PathBuf>,

    /// Article event type table (YAML)
    #[arg(long, global = true)]
    article_events: Option<PathBuf>,

    #[arg(long, global = true)]
    log_level: Option<LevelFilter>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Header counts, root nodes and a consistency check
    Info { input: PathBuf },
    /// Write scripts.yaml and summary.yaml for a fighter moveset
    Dump {
        input: PathBuf,
        #[arg(short, long, required = true)]
        output: PathBuf,
    },
    /// List the entries of a frame speed modifier container
    Fsm { input: PathBuf },
}

struct Tool {
    config: ToolConfig,
}

impl Tool {
    fn new(config: ToolConfig) -> Self {
        Self { config }
    }

    fn attributes(&self) -> Box<dyn AttributeSource> {
        match &self.config.data_dir {
            Some(dir) => Box::new(YamlAttributes::new(dir.clone())),
            None => {
                log::warn!("no data directory given, attribute tables will be unnamed");
                Box::new(NoAttributes)
            }
        }
    }

    fn schemas(&self) -> Result<EventSchemas> {
        Ok(EventSchemas::load(
            self.config.event_types.as_deref(),
            self.config.article_event_types.as_deref(),
        )?)
    }

    fn open_moveset(&self, input: &Path) -> Result<MovesetDatFile> {
        let dat = DatFile::open(input).with_context(|| format!("opening {}", input.display()))?;
        let attributes = self.attributes();
        Ok(MovesetDatFile::from_dat(dat, attributes.as_ref(), self.schemas()?)?)
    }

    fn info(&self, input: &Path) -> Result<()> {
        let dat = DatFile::open(input).with_context(|| format!("opening {}", input.display()))?;
        let info = dump::container_info(&dat)?;
        log::debug!("root nodes: {}", dump::root_names(&info));
        print!("{}", serde_yaml::to_string(&info)?);
        Ok(())
    }

    fn dump(&self, input: &Path, output: &Path) -> Result<()> {
        let moveset = self.open_moveset(input)?;
        dump::write_dump(&moveset, output)
    }

    fn fsm(&self, input: &Path) -> Result<()> {
        let fsm = FsmDatFile::open(input).with_context(|| format!("opening {}", input.display()))?;
        let entries = fsm.fsm_list()?;
        if entries.is_empty() {
            bail!("{} holds no FSM entries", input.display());
        }
        for entry in entries {
            println!("{}", entry);
        }
        Ok(())
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = ToolConfig::load(args.config.as_deref())?.with_overrides(
        args.data_dir,
        args.events,
        args.article_events,
        args.log_level,
    );
    env_logger::Builder::new()
        .filter_level(config.logger.level_filter)
        .parse_default_env()
        .init();

    let tool = Tool::new(config);
    match args.command {
        Command::Info { input } => tool.info(&input),
        Command::Dump { input, output } => tool.dump(&input, &output),
        Command::Fsm { input } => tool.fsm(&input),
    }
}
