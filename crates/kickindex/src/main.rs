//
// main.rs
//
// kickindex command-line entry point
//

use std::env;

use kickindex::cli::index_stats;

fn print_usage() {
    println!(
        "kickindex {}, a multi-variant KickAssembler source indexer.",
        env!("CARGO_PKG_VERSION")
    );
    print!(
        r#"
Usage: kickindex stats <project-dir> [OPTIONS]

Stats options:

-D SYM, -DSYM                Define a preprocessor symbol (repeatable)
--lib DIR                    Add a library directory (repeatable)
--config FILE                Read indexer settings from a JSON file
--json                       Print the report as JSON

Available options:

--version                    Print the version
--help                       Print this help message

"#
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut argv = env::args();
    argv.next(); // skip executable name

    let Some(command) = argv.next() else {
        print_usage();
        return Ok(());
    };

    match command.as_str() {
        "stats" => {
            env_logger::init();
            let args = index_stats::parse_args(&mut argv).map_err(|e| anyhow::anyhow!(e))?;
            let stats = index_stats::run_index_stats(&args).await?;
            if args.json {
                index_stats::print_report_json(&stats)?;
            } else {
                index_stats::print_report(&stats);
            }
            Ok(())
        }
        "--version" => {
            println!("kickindex {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        "--help" => {
            print_usage();
            Ok(())
        }
        other => Err(anyhow::anyhow!("Unknown argument: '{other}'")),
    }
}
