// Build Metadata and Versioning
//
// Compile-time build identity for the kernel: name, version, development
// phase, and the preformatted strings the boot path prints. A single macro
// call is the only thing to touch when the version or phase moves.

macro_rules! define_build_meta {
    ($kernel_name:literal, $version:literal, $phase:literal, $phase_label:literal, $build_date:literal) => {
        #[allow(dead_code)]
        pub const KERNEL_NAME: &str = $kernel_name;
        #[allow(dead_code)]
        pub const VERSION: &str = $version;
        #[allow(dead_code)]
        pub const PHASE: &str = $phase;
        #[allow(dead_code)]
        pub const PHASE_LABEL: &str = $phase_label;
        #[allow(dead_code)]
        pub const BUILD_DATE: &str = $build_date;

        #[allow(dead_code)]
        pub const VERSION_TAG: &str = concat!($kernel_name, " v", $version);
        pub const BOOT_BANNER: &str = concat!(
            $kernel_name,
            " v",
            $version,
            " - Phase ",
            $phase,
            ": ",
            $phase_label
        );
    };
}

define_build_meta!(
    "Ember Kernel",
    "0.1.0",
    "1",
    "User Mode Bootstrap",
    "2026-08-29"
);
