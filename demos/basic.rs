use osalloc::OsAlloc;

fn log_alloc(addr: *mut u8, size: usize) {
    println!("Requested {size} bytes of memory");
    println!("Received this address: {addr:?}");
}

fn main() {
    let allocator = OsAlloc::new();

    unsafe {
        let addr1 = allocator.malloc(8);
        log_alloc(addr1, 8);

        let addr2 = allocator.malloc(1024);
        log_alloc(addr2, 1024);

        // Large enough for a standalone mapping.
        let addr3 = allocator.malloc(256 * 1024);
        log_alloc(addr3, 256 * 1024);

        let addr4 = allocator.calloc(16, 16);
        log_alloc(addr4, 16 * 16);

        println!("Deallocating everything...");
        allocator.free(addr1);
        allocator.free(addr2);
        allocator.free(addr3);
        allocator.free(addr4);
    }
}
