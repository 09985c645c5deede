use clap::Parser;

fn main() {
    let cli = vodsyncctl::Cli::parse();
    if let Err(err) = vodsyncctl::run(cli) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
