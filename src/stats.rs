use alloc::vec::Vec;

use crate::hash_table::HashTable;

/// A snapshot of a table's occupancy and memory use.
#[derive(Debug, Clone, PartialEq)]
pub struct Stats {
    /// Number of stored entries
    pub occupied: u32,
    /// Current slot count
    pub capacity: usize,
    /// Number of slots whose metadata marks them taken
    pub occupied_slots: usize,
    /// Load factor (occupied / capacity)
    pub load_factor: f64,
    /// Longest probe sequence length of any entry
    pub max_psl: u32,
    /// Mean probe sequence length over all entries
    pub mean_psl: f64,
    /// Size of one slot in bytes
    pub slot_size: usize,
    /// Item size fixed at construction
    pub item_size: usize,
    /// Total bytes held by the slot array
    pub total_bytes: usize,
    /// Bytes held by free slots
    pub wasted_bytes: usize,
}

impl Stats {
    /// Pretty-print the statistics.
    #[cfg(feature = "std")]
    pub fn print(&self) {
        println!("=== Hash Table Statistics ===");
        println!(
            "Population: {}/{} ({:.2}% load factor)",
            self.occupied,
            self.capacity,
            self.load_factor * 100.0
        );
        println!(
            "Probe lengths: max {}, mean {:.3}",
            self.max_psl, self.mean_psl
        );
        println!(
            "Slots: {} taken, {} bytes each ({} item bytes)",
            self.occupied_slots, self.slot_size, self.item_size
        );
        println!("Total Allocated: {} bytes", self.total_bytes);
        println!(
            "Memory: {} bytes wasted ({:.02}%)",
            self.wasted_bytes,
            if self.total_bytes == 0 {
                0.0
            } else {
                (self.wasted_bytes as f64 / self.total_bytes as f64) * 100.0
            }
        );
    }
}

impl<H> HashTable<H> {
    /// Counts the entries at each probe sequence length.
    ///
    /// Index `n` of the result holds the number of entries stored `n` slots
    /// past their home slot. The vector ends at the longest observed length
    /// and is empty for an empty table.
    pub fn probe_histogram(&self) -> Vec<usize> {
        let mut hist = Vec::new();
        for index in self.slots.taken() {
            let psl = self.slots.meta(index).psl() as usize;
            if hist.len() <= psl {
                hist.resize(psl + 1, 0);
            }
            hist[psl] += 1;
        }

        hist
    }

    /// Returns occupancy and memory statistics for the current table state.
    pub fn stats(&self) -> Stats {
        let hist = self.probe_histogram();
        let occupied_slots: usize = hist.iter().sum();
        let psl_total: usize = hist.iter().enumerate().map(|(psl, n)| psl * n).sum();
        let slot_size = self.layout.slot_size();

        Stats {
            occupied: self.occupied,
            capacity: self.capacity(),
            occupied_slots,
            load_factor: self.load_factor(),
            max_psl: hist.len().saturating_sub(1) as u32,
            mean_psl: if occupied_slots == 0 {
                0.0
            } else {
                psl_total as f64 / occupied_slots as f64
            },
            slot_size,
            item_size: self.layout.item_size(),
            total_bytes: self.slots.total_bytes(),
            wasted_bytes: (self.capacity() - occupied_slots) * slot_size,
        }
    }

    /// Pretty-prints the probe-length histogram horizontally using stdout.
    #[cfg(feature = "std")]
    pub fn print_probe_histogram(&self) {
        let hist = self.probe_histogram();
        let max = hist.iter().copied().max().unwrap_or(0);
        if max == 0 {
            println!("probe histogram: empty");
            return;
        }

        let max_bar = 60usize;
        let total_units = max_bar * 8;
        println!("probe histogram ({} entries):", self.occupied);

        let make_bar = |count: usize| -> alloc::string::String {
            if count == 0 {
                return alloc::string::String::new();
            }
            let units = ((count as u128 * total_units as u128).div_ceil(max as u128)) as usize;
            let mut bar = "█".repeat(units / 8);
            let partial = ['▏', '▎', '▍', '▌', '▋', '▊', '▉'];
            if units % 8 > 0 {
                bar.push(partial[units % 8 - 1]);
            }
            bar
        };

        for (psl, &count) in hist.iter().enumerate() {
            println!("{:>4} | {} ({})", psl, make_bar(count), count);
        }
    }

    /// Prints one line per slot: its index, then `psl:hash` and the key for
    /// taken slots.
    #[cfg(feature = "std")]
    pub fn print_slots(&self) {
        for (index, (meta, key)) in self.slot_summaries().enumerate() {
            match key {
                Some(key) => println!(
                    "{index:>7} | {:04}:{:05x} {}",
                    meta.psl(),
                    meta.hash(),
                    alloc::string::String::from_utf8_lossy(key)
                ),
                None => println!("{index:>7} | empty"),
            }
        }
    }

    #[cfg(feature = "std")]
    fn slot_summaries(&self) -> impl Iterator<Item = (crate::meta::Meta, Option<&[u8]>)> + '_ {
        (0..self.capacity()).map(|index| {
            let meta = self.slots.meta(index);
            let key = meta
                .is_taken()
                .then(|| crate::slots::decode_key(self.layout.key(self.slots.slot(index))));
            (meta, key)
        })
    }
}
