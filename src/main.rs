//! `safe-erb`: check and compile ERB templates for injection safety.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use erb::snapshot::node_snapshot;
use erb::{
    CheckOptions, CompileOptions, Compiler, Config, SafetyReport, Segment, Span, TemplateLanguage,
    assert_erb_safety, tokenize,
};
use tools::LineIndex;

#[derive(Parser)]
#[command(name = "safe-erb")]
#[command(about = "Injection-safety analysis for ERB templates")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Report unsafe interpolations; exits 1 on violations, 2 on analysis errors
    Check {
        #[command(flatten)]
        template: TemplateArgs,
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Compile a template and list its guarded segments
    Compile {
        #[command(flatten)]
        template: TemplateArgs,
        /// Also reject what the static rules flag
        #[arg(long)]
        strict: bool,
        file: PathBuf,
    },
    /// Print the node stream of a template
    Tokens {
        #[arg(long, default_value = "html")]
        template_language: TemplateLanguage,
        file: PathBuf,
    },
}

#[derive(Args)]
struct TemplateArgs {
    #[arg(long, default_value = "html")]
    template_language: TemplateLanguage,
    /// TOML file with javascript attribute names and safe methods
    #[arg(long)]
    config: Option<PathBuf>,
}

impl TemplateArgs {
    fn config(&self) -> Result<Config> {
        match &self.config {
            Some(path) => Ok(Config::load(path)?),
            None => Ok(Config::default()),
        }
    }
}

fn read_template(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("failed to read template {}", path.display()))
}

fn location(path: &Path, source: &str, span: Span) -> String {
    let position = LineIndex::new(source).line_col(span.start);
    format!("{}:{}:{}", path.display(), position.line, position.column + 1)
}

fn check(template: &TemplateArgs, files: &[PathBuf]) -> Result<ExitCode> {
    let config = template.config()?;
    let options = CheckOptions {
        template_language: template.template_language,
    };
    let mut unsafe_files = 0usize;
    let mut failed_files = 0usize;
    for path in files {
        let source = read_template(path)?;
        match assert_erb_safety(&source, &config, options) {
            Ok(()) => {}
            Err(report @ SafetyReport::Violations { .. }) => {
                unsafe_files += 1;
                println!("{}:\n{report}", path.display());
            }
            Err(SafetyReport::Analysis(err)) => {
                failed_files += 1;
                eprintln!("{}: {err}", location(path, &source, err.span()));
            }
        }
    }
    log::debug!(
        "checked {} files: {unsafe_files} unsafe, {failed_files} failed",
        files.len()
    );
    Ok(if failed_files > 0 {
        ExitCode::from(2)
    } else if unsafe_files > 0 {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    })
}

fn compile(template: &TemplateArgs, strict: bool, path: &Path) -> Result<ExitCode> {
    let config = template.config()?;
    let source = read_template(path)?;
    let compiler = Compiler::new(&config).with_options(CompileOptions {
        template_language: template.template_language,
        enforce_static_rules: strict,
    });
    let program = match compiler.compile(&source) {
        Ok(program) => program,
        Err(err) => {
            eprintln!("{}: {err}", location(path, &source, err.span()));
            return Ok(ExitCode::from(1));
        }
    };
    for segment in program.segments() {
        match segment {
            Segment::Literal(text) => println!("literal {text:?}"),
            Segment::Output(output) => println!(
                "output {}{} {:?}",
                output.guard,
                if output.raw { " raw" } else { "" },
                output.code.trim()
            ),
            Segment::Statement { code, .. } => println!("statement {:?}", code.trim()),
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn tokens(template_language: TemplateLanguage, path: &Path) -> Result<ExitCode> {
    let source = read_template(path)?;
    let stream = tokenize(&source, template_language)
        .with_context(|| format!("failed to tokenize {}", path.display()))?;
    for line in node_snapshot(&stream) {
        println!("{line}");
    }
    Ok(ExitCode::SUCCESS)
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    match &cli.command {
        Command::Check { template, files } => check(template, files),
        Command::Compile {
            template,
            strict,
            file,
        } => compile(template, *strict, file),
        Command::Tokens {
            template_language,
            file,
        } => tokens(*template_language, file),
    }
}
