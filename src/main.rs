fn main() {
    if let Err(err) = gaze_engine::run() {
        eprintln!("{err:#}");
        std::process::exit(1);
    }
}
