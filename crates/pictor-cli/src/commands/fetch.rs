use anyhow::Result;
use pictor_gen::ArtifactRef;
use std::path::Path;

use super::{connect, PollOpts, ProviderOpts};

/// Download a finished job's image by URL
pub fn run(url: &str, output_dir: &Path, opts: &ProviderOpts) -> Result<()> {
    let (config, name) = opts.resolve(None)?;
    let client = connect(&config, &name, &PollOpts::default())?;

    let saved = client.download(&ArtifactRef::new(url), output_dir)?;
    println!("Downloaded: {}", saved.path.display());
    println!("  Hash: {}", saved.content_hash);
    println!("  Size: {} bytes", saved.size_bytes);
    if let Some((width, height)) = saved.dimensions {
        println!("  Dimensions: {}x{}", width, height);
    }
    Ok(())
}
