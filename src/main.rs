#[macro_use] extern crate clap;
#[macro_use] extern crate log;

use deploycat::*;
use clap::{Arg, App, AppSettings, SubCommand, ArgMatches};
use std::env;
use std::path::Path;
use std::process;

fn print_error_debug(e: &Error) {
    // unwind the error chain
    for e in e.iter().skip(1) {
        warn!("caused by: {}", e);
    }
}

fn main() {
    let app = App::new("deploycat")
        .version(crate_version!())
        .setting(AppSettings::VersionlessSubcommands)
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .setting(AppSettings::ColoredHelp)
        .setting(AppSettings::DeriveDisplayOrder)
        .global_settings(&[AppSettings::ColoredHelp])
        .about("Render and apply deployment manifests")
        .arg(Arg::with_name("verbose")
            .short("v")
            .multiple(true)
            .global(true)
            .help("Increase verbosity"))
        .arg(Arg::with_name("debug")
            .short("d")
            .long("debug")
            .global(true)
            .help("Adds line numbers to log statements"))
        .arg(Arg::with_name("namespace")
            .long("namespace")
            .takes_value(true)
            .default_value("assisted-installer")
            .global(true)
            .help("Namespace to use"))
        .arg(Arg::with_name("deploy-tag")
            .long("deploy-tag")
            .takes_value(true)
            .default_value("latest")
            .global(true)
            .help("Tag for all deployment images (empty to use $SERVICE)"))
        .arg(Arg::with_name("dryrun")
            .long("dry-run")
            .global(true)
            .help("Render manifests without applying them"))

        .subcommand(SubCommand::with_name("namespace")
            .about("Deploy the namespace")
            .arg(Arg::with_name("deploy-namespace")
                .long("deploy-namespace")
                .takes_value(true)
                .default_value("true")
                .help("Set to anything but true to skip")))

        .subcommand(SubCommand::with_name("role")
            .about("Deploy the default role"))

        .subcommand(SubCommand::with_name("scality")
            .about("Deploy the scality configmap"))

        .subcommand(SubCommand::with_name("installer")
            .about("Deploy the assisted installer inventory service")
            .arg(Arg::with_name("subsystem-test")
                .long("subsystem-test")
                .help("Deploy in subsystem test mode")))

        .subcommand(SubCommand::with_name("ui")
            .about("Deploy the ui (and an ingress for it on oc-ingress targets)")
            .arg(Arg::with_name("target")
                .long("target")
                .takes_value(true)
                .help("Deploy target (minikube, oc-ingress, ...)"))
            .arg(Arg::with_name("domain")
                .long("domain")
                .takes_value(true)
                .help("Domain for the ingress hostname")))

        .subcommand(SubCommand::with_name("template")
            .about("Render an arbitrary template and apply it")
            .arg(Arg::with_name("source")
                .required(true)
                .help("Template to read"))
            .arg(Arg::with_name("destination")
                .required(true)
                .help("Path to write the rendered manifest to"))
            .arg(Arg::with_name("set")
                .short("s")
                .long("set")
                .takes_value(true)
                .multiple(true)
                .number_of_values(1)
                .help("Substitution NAME=VALUE replacing REPLACE_NAME")));

    // arg parse
    let args = app.get_matches();
    let name = args.subcommand_name().unwrap_or("deploycat").to_string();
    let _ = run(&args).map_err(|e| {
        error!("{} error: {}", name, e);
        print_error_debug(&e);
        process::exit(1);
    });
    process::exit(0);
}

fn run(args: &ArgMatches) -> Result<()> {
    // initialise deps and set log default - always show INFO messages (+1)
    loggerv::Logger::new()
        .verbosity(args.occurrences_of("verbose") + 1)
        .module_path(true)
        .line_numbers(args.is_present("debug"))
        .init()
        .map_err(|e| format!("failed to initialise logging: {}", e))?;
    deploycat::init()?;

    // Ignore SIGPIPE errors to avoid having to use let _ = write! everywhere
    // See https://github.com/rust-lang/rust/issues/46016
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_DFL);
    }

    dispatch_commands(args)
}

/// Create the config for a subcommand
///
/// Globals propagate into the subcommand matches, so everything is read from there.
/// This is the ONLY place the environment is consulted.
fn build_config(a: &ArgMatches) -> Result<Config> {
    let mut conf = Config::default();
    if let Some(ns) = a.value_of("namespace") {
        conf.namespace = ns.into();
    }
    if let Some(tag) = a.value_of("deploy-tag") {
        conf.deploy_tag = tag.into();
    }
    conf.dry_run = a.is_present("dryrun");
    conf.subsystem_test = a.is_present("subsystem-test");
    if let Some(t) = a.value_of("target") {
        conf.target = Some(t.parse()?);
    }
    conf.domain = a.value_of("domain").map(String::from);
    if let Some(dn) = a.value_of("deploy-namespace") {
        conf.deploy_namespace = dn.to_lowercase() == "true";
    }
    conf.service_image = env::var(config::SERVICE_IMAGE_EVAR).ok();
    conf.verify()?;
    debug!("Using {:?}", conf);
    Ok(conf)
}

fn void<T>(_x: T) { () } // helper so that dispatch_commands can return Result<()>

/// Dispatch clap arguments to deploy steps
fn dispatch_commands(args: &ArgMatches) -> Result<()> {
    let cluster = Kubectl::default();

    if let Some(a) = args.subcommand_matches("namespace") {
        let conf = build_config(a)?;
        return deploy::namespace(&conf, &cluster).map(void);
    }
    else if let Some(a) = args.subcommand_matches("role") {
        let conf = build_config(a)?;
        return deploy::role(&conf, &cluster).map(void);
    }
    else if let Some(a) = args.subcommand_matches("scality") {
        let conf = build_config(a)?;
        return deploy::scality(&conf, &cluster).map(void);
    }
    else if let Some(a) = args.subcommand_matches("installer") {
        let conf = build_config(a)?;
        return deploy::installer(&conf, &cluster).map(void);
    }
    else if let Some(a) = args.subcommand_matches("ui") {
        let conf = build_config(a)?;
        return deploy::ui(&conf, &cluster, &Docker::default()).map(void);
    }
    else if let Some(a) = args.subcommand_matches("template") {
        let conf = build_config(a)?;
        // both required above
        let src = Path::new(a.value_of("source").unwrap_or_default());
        let dst = Path::new(a.value_of("destination").unwrap_or_default());
        // NAMESPACE always available, explicit sets win
        let mut subs = conf.base_substitutions();
        for raw in a.values_of("set").into_iter().flatten() {
            let (k, v) = Substitutions::parse_pair(raw)?;
            subs.insert(k, v);
        }
        return deploy::text(&conf, &cluster, src, dst, &subs);
    }

    unreachable!("Subcommand valid, but not implemented");
}
