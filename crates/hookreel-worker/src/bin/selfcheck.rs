use std::path::Path;

use hookreel_media::{check_ffmpeg, check_ffprobe};
use hookreel_storage::R2Config;
use hookreel_worker::PipelineConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = PipelineConfig::from_env()?;

    println!(
        "hookreel-selfcheck: starting with work_dir={}",
        config.work_dir.root().display()
    );
    ensure_workdir(config.work_dir.root()).await?;

    let ffmpeg = check_ffmpeg()?;
    let ffprobe = check_ffprobe()?;
    println!("hookreel-selfcheck: ffmpeg={} ffprobe={}", ffmpeg.display(), ffprobe.display());

    for input in [&config.inputs.main, &config.inputs.hook, &config.inputs.music] {
        if !input.exists() {
            println!("hookreel-selfcheck: warning: input {} not found", input.display());
        }
    }

    let r2 = R2Config::from_env()?;
    println!("hookreel-selfcheck: bucket={}", r2.bucket_name);

    println!("hookreel-selfcheck: ok");
    Ok(())
}

async fn ensure_workdir<P: AsRef<Path>>(path: P) -> anyhow::Result<()> {
    let path = path.as_ref();
    tokio::fs::create_dir_all(path).await?;
    Ok(())
}
