fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    #[cfg(feature = "mpi")]
    probe_mpi();
}

/// Records which MPI library the `system` backend is linked against.
#[cfg(feature = "mpi")]
fn probe_mpi() {
    match build_probe_mpi::probe() {
        Ok(lib) => {
            println!("cargo:rustc-env=ALLREDUCE_MPI_VERSION={}", lib.version);
        }
        Err(errs) => {
            for err in errs {
                println!("cargo:warning=could not probe MPI library: {}", err);
            }
        }
    }
}
