use std::path::Path;
use std::process::Command;

use vr360_worker::WorkerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = WorkerConfig::from_env();
    config.validate()?;

    println!(
        "worker-selfcheck: starting with work_dir={}",
        config.work_dir.display()
    );
    ensure_workdir(&config.work_dir).await?;
    vr360_media::check_ffmpeg()?;
    vr360_media::check_ffprobe()?;
    ensure_v360_filter()?;

    println!("worker-selfcheck: ok");
    Ok(())
}

async fn ensure_workdir<P: AsRef<Path>>(path: P) -> anyhow::Result<()> {
    let path = path.as_ref();
    tokio::fs::create_dir_all(path).await?;
    tempfile::NamedTempFile::new_in(path)
        .map_err(|e| anyhow::anyhow!("work dir {} is not writable: {}", path.display(), e))?;
    Ok(())
}

/// Every projection conversion goes through FFmpeg's v360 filter.
fn ensure_v360_filter() -> anyhow::Result<()> {
    let output = Command::new("ffmpeg")
        .args(["-hide_banner", "-filters"])
        .output()
        .map_err(|e| anyhow::anyhow!("ffmpeg not available: {}", e))?;

    if !output.status.success() {
        return Err(anyhow::anyhow!(
            "ffmpeg -filters failed: {:?}",
            output.status
        ));
    }
    let listing = String::from_utf8_lossy(&output.stdout);
    if !listing.split_whitespace().any(|word| word == "v360") {
        return Err(anyhow::anyhow!("ffmpeg was built without the v360 filter"));
    }
    Ok(())
}
