fn main() {
    // ESP-IDF link arguments and sysenv; host builds have nothing to generate.
    #[cfg(feature = "espidf")]
    embuild::espidf::sysenv::output();
}
