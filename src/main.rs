fn main() {
    telepsi_billing::run();
}
