use grab_tracker::capture::{CameraSource, FrameSource};

fn main() {
    tracing_subscriber::fmt::init();
    println!("Testing camera access...\n");

    match nokhwa::query(nokhwa::utils::ApiBackend::Auto) {
        Ok(cameras) => {
            println!("Found {} camera(s):", cameras.len());
            for (i, camera) in cameras.iter().enumerate() {
                println!("  [{}] {}", i, camera.human_name());
            }
        }
        Err(e) => println!("Failed to query cameras: {}", e),
    }

    match CameraSource::new(0) {
        Ok(mut camera) => {
            println!("✓ Camera opened");
            match camera.next_frame() {
                Ok(Some(frame)) => println!("✓ Frame captured: {}x{}", frame.width, frame.height),
                Ok(None) => println!("✗ Camera returned no frame"),
                Err(e) => println!("✗ Failed to capture frame: {:#}", e),
            }
        }
        Err(e) => {
            println!("✗ Failed to open camera: {:#}", e);
            println!("\nPossible causes:");
            println!("1. Camera is being used by another app");
            println!("2. Camera permissions not granted");
            println!("3. No camera connected");
        }
    }
}
