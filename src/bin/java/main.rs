use std::process;

use clap::Parser;
use jvm_runtime::{
    classpath::ClassPath,
    runtime::{Vm, VmOptions},
};

#[derive(Parser, Debug)]
#[command(name = "java", version, about = "Runs the main method of a class")]
struct Cli {
    /// Directories, jars and `dir/*` wildcards to search for user classes
    #[arg(long = "classpath", visible_alias = "cp", value_name = "PATH")]
    class_path: Option<String>,

    /// JRE directory holding lib/*.jar
    #[arg(long = "xjre", value_name = "DIR")]
    jre: Option<String>,

    /// Log loaded classes and calls
    #[arg(long)]
    verbose: bool,

    /// Trace every executed instruction
    #[arg(long)]
    verbose_inst: bool,

    /// Main class, slashes or dots
    class: String,

    /// Arguments passed to main
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

/// Accepts the single-dash spellings of the JDK launcher. Everything from the class name on
/// is left alone.
fn normalize_args(args: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut normalized = Vec::new();
    let mut options_done = false;
    let mut takes_value = false;
    for (index, arg) in args.into_iter().enumerate() {
        if index == 0 || options_done {
            normalized.push(arg);
            continue;
        }
        if takes_value {
            takes_value = false;
            normalized.push(arg);
            continue;
        }
        let arg = match arg.as_str() {
            "-cp" | "-classpath" => "--classpath".to_string(),
            "-Xjre" => "--xjre".to_string(),
            "-verbose" | "-verbose:class" => "--verbose".to_string(),
            "-verbose-inst" => "--verbose-inst".to_string(),
            "-version" => "--version".to_string(),
            _ => arg,
        };
        match arg.as_str() {
            "--classpath" | "--cp" | "--xjre" => takes_value = true,
            other if !other.starts_with('-') => options_done = true,
            _ => {}
        }
        normalized.push(arg);
    }
    normalized
}

fn init_logger(cli: &Cli) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    if cli.verbose_inst {
        builder.filter_module("jvm_runtime", log::LevelFilter::Trace);
    } else if cli.verbose {
        builder.filter_module("jvm_runtime", log::LevelFilter::Info);
    }
    builder.init();
}

fn main() {
    let cli = Cli::parse_from(normalize_args(std::env::args()));
    init_logger(&cli);

    let class_path = ClassPath::parse(cli.jre.as_deref(), cli.class_path.as_deref());
    log::info!("class path: {class_path:?}");
    let options = VmOptions {
        verbose_class: cli.verbose,
        verbose_inst: cli.verbose_inst,
        ..VmOptions::default()
    };
    let vm = Vm::new(options, Box::new(class_path));

    if let Err(err) = vm.run_main(&cli.class, &cli.args) {
        log::error!("{} terminated abnormally", cli.class);
        eprintln!("{err}");
        process::exit(1);
    }
}
