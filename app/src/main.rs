fn main() {
    if let Err(err) = streamer_client::run() {
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}
