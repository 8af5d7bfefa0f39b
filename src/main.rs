use linkfield::{Engine, EngineOptions};

fn main() {
    let options = EngineOptions::from_args(std::env::args());
    if let Err(e) = Engine::run(options) {
        eprintln!("Linkfield failed to start: {}", e);
        std::process::exit(1);
    }
}
