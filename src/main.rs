// Chest X-ray pathology scoring service.
//
// Run with:
//   LUNGSCAN_MODEL_PATH=models/densenet121-res224-all.json cargo run --release
// Then POST an image to http://127.0.0.1:5000/analyze (field `image`).

fn main() {
    lungscan::init_tracing();

    if let Err(e) = lungscan::run() {
        tracing::error!(error = %e, "lungscan failed to start");
        std::process::exit(1);
    }
}
