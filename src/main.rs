use std::collections::HashSet;

use clap::{CommandFactory, Parser};
use clap_complete::generate;

use betadiv::calculator::Calculator;
use betadiv::clustering;
use betadiv::engine::{self, Engine};
use betadiv::error::{BetaDivError, DataConsistencyError};
use betadiv::matrix::DissimilarityMatrix;
use betadiv::tree::Tree;
use betadiv::tree_generation;

mod cli;

fn main() {
    let args = cli::Args::parse();
    if args.verbose {
        env_logger::Builder::new()
            .filter_level(log::LevelFilter::Info)
            .init();
    } else {
        env_logger::Builder::new()
            .filter_level(log::LevelFilter::Warn)
            .init();
    }

    if let Err(err) = run(args) {
        eprintln!("betadiv: {err}");
        std::process::exit(1);
    }
}

fn run(args: cli::Args) -> Result<(), BetaDivError> {
    let verbose = args.verbose;
    match args.command {
        cli::Commands::Dissimilarity {
            table,
            tree,
            calculator,
            output,
            unweighted,
            mrca,
            strict_mrca,
            use_counts,
            max_vecs,
            clustering,
            jackknife_reps,
            draw_size,
        } => {
            let calculator = Calculator::parse(&calculator)?;
            let mut engine = Engine::open_files(
                &table,
                tree.as_deref(),
                calculator,
                max_vecs,
                !unweighted,
                mrca,
                strict_mrca,
                use_counts,
                verbose,
            )?;
            engine.dissimilarity(&output, clustering, jackknife_reps, draw_size)
        }

        cli::Commands::All {
            table,
            tree,
            output,
            threshold,
            clustering,
            max_vecs,
            mrca,
            strict_mrca,
            use_counts,
        } => engine::run_all(
            &table,
            tree.as_deref(),
            &output,
            threshold,
            clustering,
            max_vecs,
            mrca,
            strict_mrca,
            use_counts,
        ),

        cli::Commands::List => {
            for &calculator in Calculator::ALL {
                let aliases = calculator.aliases();
                if aliases.is_empty() {
                    println!("{}", calculator.canonical_name());
                } else {
                    println!("{}\t({})", calculator.canonical_name(), aliases.join(", "));
                }
            }
            Ok(())
        }

        cli::Commands::Cluster {
            matrix,
            method,
            output,
        } => {
            let matrix = DissimilarityMatrix::from_file(&matrix)?;
            let tree = clustering::cluster(&matrix, method);
            tree.to_file(&output)
                .map_err(|e| BetaDivError::io(&output, std::io::Error::other(e)))
        }

        cli::Commands::Project {
            tree,
            keep,
            output,
        } => {
            let mut tree = Tree::from_file(&tree)?;
            let keep_text =
                std::fs::read_to_string(&keep).map_err(|e| BetaDivError::io(&keep, e))?;
            let keep_set: HashSet<String> = keep_text
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(String::from)
                .collect();
            tree.project(&keep_set);
            tree.to_file(&output)
                .map_err(|e| BetaDivError::io(&output, std::io::Error::other(e)))
        }

        cli::Commands::Generate {
            tips,
            shape,
            branch_lengths,
            distribution,
            output,
            trees,
        } => {
            if let Some(ntrees) = trees {
                std::fs::create_dir_all(&output).map_err(|e| BetaDivError::io(&output, e))?;
                for i in 1..=ntrees {
                    let path = output.join(format!("{i}_{tips}_tips.nwk"));
                    let random = tree_generation::generate(shape, tips, branch_lengths, distribution)
                        .map_err(DataConsistencyError::from)?;
                    random
                        .to_file(&path)
                        .map_err(|e| BetaDivError::io(&path, std::io::Error::other(e)))?;
                }
            } else {
                let random = tree_generation::generate(shape, tips, branch_lengths, distribution)
                    .map_err(DataConsistencyError::from)?;
                random
                    .to_file(&output)
                    .map_err(|e| BetaDivError::io(&output, std::io::Error::other(e)))?;
            }
            Ok(())
        }

        cli::Commands::Completions { shell } => {
            let mut command = cli::Args::command();
            let name = command.get_name().to_string();
            generate(shell, &mut command, name, &mut std::io::stdout());
            Ok(())
        }
    }
}
