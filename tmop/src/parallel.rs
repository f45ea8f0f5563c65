use std::num::NonZeroUsize;
use std::sync::OnceLock;

static ASSEMBLY_THREADS: OnceLock<usize> = OnceLock::new();

/// Size the global rayon pool that element assembly runs on, and return how
/// many threads it has. `threads == 0` asks for one per available core.
///
/// The pool is set up once per process. Later calls return the first
/// answer whatever they ask for, and a pool somebody else built already is
/// used as it is.
pub fn init_global_parallelism(threads: usize) -> usize {
    *ASSEMBLY_THREADS.get_or_init(|| {
        let requested = NonZeroUsize::new(threads)
            .or_else(|| std::thread::available_parallelism().ok())
            .map_or(1, NonZeroUsize::get);
        if let Err(e) = rayon::ThreadPoolBuilder::new()
            .num_threads(requested)
            .build_global()
        {
            tracing::debug!(requested, %e, "keeping the existing rayon pool");
        }
        rayon::current_num_threads()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_is_sized_once() {
        let first = init_global_parallelism(0);
        assert!(first >= 1);
        assert_eq!(init_global_parallelism(3), first);
        assert_eq!(rayon::current_num_threads(), first);
    }
}
