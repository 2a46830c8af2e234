//! Generates foreign-language bindings for the `consentkit` library.

fn main() {
    uniffi::uniffi_bindgen_main();
}
