#![warn(clippy::all)]
use aws::Ec2Client;
use clap::{CommandFactory, Parser};
use config::{Args, Config};
use itertools::Itertools;
use prelude::*;
use std::io::stdout;

mod aws;
mod config;
mod credentials;
mod inventory;
mod parsers;
mod prelude;

fn main() -> Result<()> {
    let args = Args::parse();
    if let Some(shell) = args.completions {
        clap_complete::generate(shell, &mut Args::command(), env!("CARGO_PKG_NAME"), &mut stdout());
        return Ok(());
    }
    let cfg = Config::load(&args).wrap_err("Can't load config")?;
    run(&cfg, args.print, args.verbose)
}

fn run(cfg: &Config, print: bool, verbose: bool) -> Result<()> {
    let cred = credentials::resolve(cfg.profile.as_deref(), cfg.region.as_deref())
        .wrap_err("Can't resolve aws credentials")?;
    if verbose {
        p!("Using profile {} in {}", cred.profile, cred.region);
        let filters = aws::instance_filters(&cfg.tags)
            .iter()
            .map(|filter| f!("{}={}", filter.name, filter.values.join(",")))
            .join(" ");
        p!("Filters: {filters}");
    }
    let client = Ec2Client::new(cred, cfg.endpoint.clone());
    let records = {
        let _guard = verbose.then(|| stopwatch("DescribeInstances"));
        aws::collect(&client, &cfg.tags).wrap_err("Can't collect instances")?
    };
    if print {
        inventory::render(&records, &mut stdout().lock())?;
        return Ok(());
    }
    inventory::write_inventory(&records, &cfg.output)
        .wrap_err_with(|| f!("Can't write inventory to {:?}", cfg.output))?;
    if verbose {
        let groups = inventory::group_records(&records).len();
        p!("{} hosts in {groups} groups written to {:?}", records.len(), cfg.output);
    }
    p!("Done.");
    Ok(())
}
