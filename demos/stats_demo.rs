use clap::Parser;
use rh_table::Builder;
use rh_table::Error;

#[derive(Parser, Debug)]
struct Args {
    #[arg(short = 'n', long = "elements", default_value_t = 1000)]
    elements: usize,

    #[arg(short = 's', long = "item_size", default_value_t = 8)]
    item_size: usize,

    /// Preallocate room for all elements instead of growing from 16 slots.
    #[arg(short = 'p', long = "preallocate")]
    preallocate: bool,

    /// Remove every other key after filling the table.
    #[arg(short = 'r', long = "remove_half")]
    remove_half: bool,
}

fn main() -> Result<(), Error> {
    let args = Args::parse();

    println!(
        "Creating table for {} items of {} bytes",
        args.elements, args.item_size
    );

    let mut builder = Builder::new(args.item_size);
    if args.preallocate {
        builder = builder.elements(args.elements);
    }
    let mut table = builder.build()?;

    println!(
        "Initial capacity: {} slots of {} bytes",
        table.capacity(),
        table.slot_size()
    );

    let mut item = vec![0u8; args.item_size];
    let mut num_failures = 0;
    for i in 0..args.elements {
        for (offset, byte) in item.iter_mut().enumerate() {
            *byte = (i + offset) as u8;
        }

        match table.insert(format!("key_{i}"), &item) {
            Ok(()) => {}
            Err(Error::CapacityExhausted | Error::ProbeLimit) => num_failures += 1,
            Err(err) => return Err(err),
        }
    }

    println!("Inserted {} values into table", table.len());

    if args.remove_half {
        let removed = (0..args.elements)
            .step_by(2)
            .filter(|i| table.remove(format!("key_{i}")).is_some())
            .count();
        println!("Removed {removed} values");
    }

    println!(
        "Final load factor: {:.2}% of {} slots",
        table.load_factor() * 100.0,
        table.capacity()
    );

    table.print_probe_histogram();
    table.stats().print();
    println!(
        "Number of failed inserts: {} ({:.02}%)",
        num_failures,
        num_failures as f64 / args.elements.max(1) as f64 * 100.0
    );

    Ok(())
}
