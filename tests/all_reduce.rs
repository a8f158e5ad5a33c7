use allreduce::local::{self, LocalFabric};
use allreduce::traits::*;
use allreduce::{Algorithm, Config, Error, Rank, ReceiveOrder};
use rstest::rstest;

/// Runs one all-reduce on a fresh local group and collects every rank's output.
fn all_reduce<F>(
    size: Rank,
    algorithm: Algorithm,
    config: Config,
    input: F,
) -> Vec<allreduce::Result<Vec<f32>>>
where
    F: Fn(Rank) -> Vec<f32> + Sync,
{
    local::run(size, |comm| {
        let sendbuf = input(comm.rank());
        let mut recvbuf = vec![0.0f32; sendbuf.len()];
        comm.all_reduce_into(algorithm, &config, &sendbuf, &mut recvbuf)
            .map(|_| recvbuf)
    })
    .unwrap()
}

fn assert_all_equal(results: Vec<allreduce::Result<Vec<f32>>>, expected: &[f32]) {
    for (rank, result) in results.into_iter().enumerate() {
        assert_eq!(result.unwrap(), expected, "rank {}", rank);
    }
}

#[rstest]
#[case::naive_of_four(Algorithm::Naive, 4, 4)]
#[case::tree_of_four(Algorithm::Tree, 4, 4)]
#[case::ring_of_three(Algorithm::Ring, 3, 6)]
#[case::tree_of_three_falls_back(Algorithm::Tree, 3, 6)]
fn all_ones_sum_to_group_size(
    #[case] algorithm: Algorithm,
    #[case] size: Rank,
    #[case] len: usize,
) {
    let results = all_reduce(size, algorithm, Config::default(), |_| vec![1.0; len]);
    assert_all_equal(results, &vec![size as f32; len]);
}

#[test]
fn ring_rejects_indivisible_length_on_every_rank() {
    let fabric = LocalFabric::new(3).unwrap();
    let results = fabric
        .run(|comm| {
            let sendbuf = vec![1.0f32; 5];
            let mut recvbuf = vec![0.0f32; 5];
            comm.ring_all_reduce_into(&Config::default(), &sendbuf, &mut recvbuf)
        })
        .unwrap();

    for result in results {
        let err = result.unwrap_err();
        assert!(matches!(err, Error::IndivisibleBuffer { len: 5, size: 3 }));
        assert!(err.is_fatal());
    }
    assert_eq!(fabric.undelivered(), 0);
}

#[rstest]
fn every_strategy_at_every_size(
    #[values(Algorithm::Naive, Algorithm::Ring, Algorithm::Tree)] algorithm: Algorithm,
    #[values(1, 2, 3, 4, 5, 6, 7, 8)] size: Rank,
) {
    let len = 3 * size as usize;
    let results = all_reduce(size, algorithm, Config::default(), |rank| {
        (0..len).map(|i| ((rank + 1) as usize * (i + 1)) as f32).collect()
    });
    let triangle = (size * (size + 1) / 2) as usize;
    let expected: Vec<f32> = (0..len).map(|i| (triangle * (i + 1)) as f32).collect();
    assert_all_equal(results, &expected);
}

#[rstest]
#[case::naive(Algorithm::Naive)]
#[case::ring(Algorithm::Ring)]
#[case::tree(Algorithm::Tree)]
fn agrees_with_reference(#[case] algorithm: Algorithm) {
    let config = Config::default();
    let outputs = local::run(8, |comm| {
        let sendbuf: Vec<f32> = (0..64)
            .map(|i| ((comm.rank() * 7 + i * 13) % 17) as f32 / 8.0)
            .collect();
        let mut ours = vec![0.0f32; sendbuf.len()];
        let mut reference = vec![0.0f32; sendbuf.len()];
        comm.all_reduce_into(algorithm, &config, &sendbuf, &mut ours)?;
        comm.reference_all_reduce_into(&sendbuf, &mut reference)?;
        Ok::<_, Error>((ours, reference))
    })
    .unwrap();

    for output in outputs {
        let (ours, reference) = output.unwrap();
        for (a, b) in ours.iter().zip(&reference) {
            assert!((a - b).abs() < 1e-5, "{} != {}", a, b);
        }
    }
}

#[rstest]
#[case::naive_in_rank_order(Algorithm::Naive)]
#[case::ring(Algorithm::Ring)]
#[case::tree(Algorithm::Tree)]
fn repeated_runs_are_bit_identical(#[case] algorithm: Algorithm) {
    let config = Config::default().with_receive_order(ReceiveOrder::RankOrder);
    let input = |rank: Rank| -> Vec<f32> {
        (0..40)
            .map(|i| 0.1 * (rank + 1) as f32 + 0.01 * i as f32)
            .collect()
    };

    let first = all_reduce(8, algorithm, config, input);
    let second = all_reduce(8, algorithm, config, input);
    for (a, b) in first.into_iter().zip(second) {
        let bits = |v: Vec<f32>| v.into_iter().map(f32::to_bits).collect::<Vec<_>>();
        assert_eq!(bits(a.unwrap()), bits(b.unwrap()));
    }
}

#[rstest]
#[case::any_source(ReceiveOrder::AnySource)]
#[case::rank_order(ReceiveOrder::RankOrder)]
fn naive_with_another_aggregator(#[case] order: ReceiveOrder) {
    let config = Config::default()
        .with_master_rank(2)
        .with_receive_order(order);
    let results = all_reduce(5, Algorithm::Naive, config, |rank| vec![rank as f32; 4]);
    assert_all_equal(results, &[10.0; 4]);
}

#[test]
fn tree_fallback_matches_naive() {
    let config = Config::default().with_receive_order(ReceiveOrder::RankOrder);
    let input = |rank: Rank| vec![0.3 * rank as f32, 1.0, -2.5];

    let ran = local::run(6, |comm| {
        let sendbuf = input(comm.rank());
        let mut recvbuf = vec![0.0f32; 3];
        comm.all_reduce_into(Algorithm::Tree, &config, &sendbuf, &mut recvbuf)
    })
    .unwrap();
    for algorithm in ran {
        assert_eq!(algorithm.unwrap(), Algorithm::Naive);
    }

    let tree = all_reduce(6, Algorithm::Tree, config, input);
    let naive = all_reduce(6, Algorithm::Naive, config, input);
    for (a, b) in tree.into_iter().zip(naive) {
        assert_eq!(a.unwrap(), b.unwrap());
    }
}

#[test]
fn aggregator_outside_the_group() {
    let fabric = LocalFabric::new(4).unwrap();
    let config = Config::default().with_master_rank(4);
    let results = fabric
        .run(|comm| {
            let mut recvbuf = [0.0f32; 2];
            comm.naive_all_reduce_into(&config, &[1.0, 1.0], &mut recvbuf)
        })
        .unwrap();
    for result in results {
        assert!(matches!(result, Err(Error::InvalidRoot { root: 4, size: 4 })));
    }
    assert_eq!(fabric.undelivered(), 0);
}

#[rstest]
#[case::naive(Algorithm::Naive)]
#[case::ring(Algorithm::Ring)]
#[case::tree(Algorithm::Tree)]
fn buffers_of_different_length(#[case] algorithm: Algorithm) {
    let fabric = LocalFabric::new(2).unwrap();
    let results = fabric
        .run(|comm| {
            let mut recvbuf = [0.0f32; 3];
            comm.all_reduce_into(algorithm, &Config::default(), &[1.0, 1.0], &mut recvbuf)
        })
        .unwrap();
    for result in results {
        assert!(matches!(
            result,
            Err(Error::BufferLengthMismatch {
                send: 2,
                receive: 3
            })
        ));
    }
    assert_eq!(fabric.undelivered(), 0);
}

#[test]
fn consecutive_collectives_share_a_group() {
    let fabric = LocalFabric::new(4).unwrap();
    let config = Config::default().with_data_tag(42);
    let results = fabric
        .run(|comm| {
            let sendbuf = vec![comm.rank() as f32; 8];
            let mut sums = Vec::new();
            let schedule = [
                Algorithm::Naive,
                Algorithm::Ring,
                Algorithm::Tree,
                Algorithm::Ring,
            ];
            for algorithm in schedule {
                let mut recvbuf = vec![0.0f32; 8];
                comm.all_reduce_into(algorithm, &config, &sendbuf, &mut recvbuf)?;
                sums.push(recvbuf);
            }
            Ok::<_, Error>(sums)
        })
        .unwrap();

    for result in results {
        for sum in result.unwrap() {
            assert_eq!(sum, vec![6.0; 8]);
        }
    }
    assert_eq!(fabric.undelivered(), 0);
}
