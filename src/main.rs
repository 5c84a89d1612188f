use esyi::cli::EsyCli;

fn main() {
    let cli = EsyCli::parse();
    if let Err(e) = cli.run() {
        eprintln!("esy error: {:#}", e);
        std::process::exit(1);
    }
}
