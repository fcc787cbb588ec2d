use anyhow::{bail, Result};
use clap::Args;
use indextracker_lib::catalog::IndexDescriptor;
use indextracker_lib::{IndexCatalog, IndexGroup};

use crate::output::{print_indices, OutputFormat};

#[derive(Args)]
pub struct IndicesArgs {
    /// Which indices to list: default, additional, all
    #[arg(long, default_value = "all")]
    pub group: String,

    /// Only list indices in these regions (comma-separated, case-insensitive)
    #[arg(long, value_delimiter = ',')]
    pub region: Vec<String>,
}

fn select<'a>(catalog: &'a IndexCatalog, args: &IndicesArgs) -> Result<Vec<&'a IndexDescriptor>> {
    let mut indices: Vec<&IndexDescriptor> = match args.group.as_str() {
        "all" => catalog.indices().iter().collect(),
        "default" => catalog.group(IndexGroup::Default),
        "additional" => catalog.group(IndexGroup::Additional),
        other => bail!(
            "unknown group '{}' (expected default, additional, or all)",
            other
        ),
    };
    if !args.region.is_empty() {
        let wanted: Vec<String> = args.region.iter().map(|r| r.trim().to_lowercase()).collect();
        indices.retain(|i| wanted.contains(&i.region.to_lowercase()));
    }
    Ok(indices)
}

pub fn run(args: &IndicesArgs, catalog: &IndexCatalog, format: &OutputFormat) -> Result<()> {
    let indices = select(catalog, args)?;
    eprintln!(
        "{} indices (catalog v{}, {} regions)",
        indices.len(),
        catalog.version(),
        catalog.regions().len()
    );
    print_indices(&indices, format)
}
