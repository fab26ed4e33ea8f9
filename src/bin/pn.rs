use std::fs;
use std::time::Instant;

use anyhow::{Context, Result, anyhow};

use pnsim::config::SimConfig;
use pnsim::models;
use pnsim::net::io;
use pnsim::options::Options;
use pnsim::report::ExplorationReport;
use pnsim::sim::Animator;

fn main() -> Result<()> {
    if std::env::var("PN_LOG").is_ok() {
        let e = env_logger::Env::new()
            .filter("PN_LOG")
            .write_style("PN_LOG_STYLE");
        env_logger::init_from_env(e);
    }

    // PN_FLAGS 中的参数在前，命令行参数可覆盖它们
    let mut flags = shellwords::split(&std::env::var("PN_FLAGS").unwrap_or_default())
        .map_err(|err| anyhow!("invalid PN_FLAGS: {err}"))?;
    flags.extend(std::env::args().skip(1));
    let options = Options::parse_from_args(&flags).map_err(|err| anyhow!("{err}"))?;
    log::debug!("PN options: {:?}", options);

    let mut config = SimConfig::load_from_file(&options.config)?;
    options.apply_to(&mut config);
    log::debug!("PN config: {:?}", config);

    let mut net = models::build(&options.model)?;

    if options.explore {
        let start = Instant::now();
        let graph = net.explore(config.max_states)?;
        let report = ExplorationReport::from_graph(&options.model, &graph, start.elapsed());
        print!("{report}");
        if let Some(output) = &options.output {
            io::write(output, &report, config.format)
                .with_context(|| format!("Failed to write report: {output}"))?;
        }
        if let Some(path) = &options.dot {
            fs::write(path, graph.to_dot())
                .with_context(|| format!("Failed to write DOT file: {path}"))?;
        }
        return Ok(());
    }

    if let Some(path) = &options.dot {
        fs::write(path, net.to_dot()).with_context(|| format!("Failed to write DOT file: {path}"))?;
    }
    let mut animator = Animator::new(config.seed);
    let report = animator.run(
        &mut net,
        &options.model,
        config.steps,
        config.record_markings,
    )?;
    match &options.output {
        Some(output) => {
            io::write(output, &report, config.format)
                .with_context(|| format!("Failed to write report: {output}"))?;
            print!("{report}");
        }
        None => println!("{}", io::render(&report, config.format)?),
    }
    Ok(())
}
