use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;

const SWIFT_SOURCE: &str = "src/swift/VisionOCR.swift";
const FRAMEWORKS: [&str; 3] = ["Vision", "Foundation", "CoreGraphics"];

fn main() {
    println!("cargo:rerun-if-changed={SWIFT_SOURCE}");

    if env::var("CARGO_CFG_TARGET_OS").unwrap_or_default() != "macos" {
        return;
    }

    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());
    let arch = env::var("CARGO_CFG_TARGET_ARCH").unwrap();

    let object = out_dir.join("ScribeVision.o");
    run(Command::new("swiftc")
        .args(["-emit-object", "-O", "-parse-as-library", "-target"])
        .arg(format!("{arch}-apple-macosx11.0"))
        .arg("-o")
        .arg(&object)
        .arg(SWIFT_SOURCE));

    let archive = out_dir.join("libscribe_vision.a");
    run(Command::new("ar").arg("rcs").arg(&archive).arg(&object));

    println!("cargo:rustc-link-search=native={}", out_dir.display());
    println!("cargo:rustc-link-lib=static=scribe_vision");
    for framework in FRAMEWORKS {
        println!("cargo:rustc-link-lib=framework={framework}");
    }
    link_swift_runtime();
}

fn link_swift_runtime() {
    let sdk = xcrun(&["--show-sdk-path"]);
    println!("cargo:rustc-link-search=native={sdk}/usr/lib/swift");

    // <toolchain>/usr/bin/swift -> <toolchain>/usr/lib/swift/macosx
    let swift = PathBuf::from(xcrun(&["--toolchain", "default", "--find", "swift"]));
    if let Some(usr) = swift.parent().and_then(Path::parent) {
        println!(
            "cargo:rustc-link-search=native={}",
            usr.join("lib/swift/macosx").display()
        );
    }
    println!("cargo:rustc-link-lib=dylib=swiftCore");
}

fn xcrun(args: &[&str]) -> String {
    let output = Command::new("xcrun")
        .args(args)
        .output()
        .expect("failed to run xcrun");
    assert!(output.status.success(), "xcrun {args:?} failed");
    String::from_utf8(output.stdout)
        .expect("xcrun printed non-utf8 output")
        .trim()
        .to_string()
}

fn run(cmd: &mut Command) {
    let status = cmd
        .status()
        .unwrap_or_else(|e| panic!("failed to spawn {cmd:?}: {e}"));
    assert!(status.success(), "{cmd:?} failed with {status}");
}
