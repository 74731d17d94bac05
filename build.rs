fn main() {
    // LAPACK (dgees, dgeev) comes from the Accelerate framework on macOS;
    // other targets get it through ndarray-linalg's OpenBLAS backend.
    #[cfg(target_os = "macos")]
    {
        println!("cargo:rustc-link-lib=framework=Accelerate");
    }
}
