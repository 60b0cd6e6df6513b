//! The transciphering orchestrator: the key dealer issues all key material,
//! data owners encrypt weight rows under the Rubato keystream, the
//! aggregator homomorphically decrypts the symmetric ciphertexts into CKKS
//! ciphertexts and computes the encrypted mean, and the key holder decrypts
//! the result.

use crate::bfv::{Ciphertext, FvEncoder, FvEvaluator, PlaintextRingT};
use crate::ckks::{CkksEncoder, CkksEvaluator};
use crate::halfboot::HalfBootstrapper;
use crate::keys::{PublicKey, RelinearizationKey, RotationKeySet, SecretKey};
use crate::rubato::{plain_rubato, MfvRubato, ModDownParams, RubatoParam};
use crate::serialization;
use crate::stc::SlotsToCoeffs;
use crate::{Error, Parameters, Result};
use rand::{CryptoRng, Rng, RngCore};
use rtf_util::bit_reverse;
use std::path::Path;
use std::sync::Arc;

/// All key material and pre-computed transforms issued by the dealer.
#[derive(Debug)]
pub struct KeyDealer {
    par: Arc<Parameters>,
    rubato_param: RubatoParam,
    mod_down: ModDownParams,

    /// The secret key; only the holder may use it.
    pub sk: SecretKey,
    /// The public key, used to encrypt the symmetric key.
    pub pk: PublicKey,
    /// The relinearization key.
    pub rlk: RelinearizationKey,
    /// The rotation key set covering the StC and HalfBoot rotations.
    pub rtks: RotationKeySet,

    /// The FV slot encoder.
    pub fv_encoder: FvEncoder,
    /// The CKKS encoder.
    pub ckks_encoder: CkksEncoder,
    /// The Slots-to-Coefficients transform.
    pub stc: SlotsToCoeffs,
    /// The half-bootstrapper.
    pub half_bootstrapper: HalfBootstrapper,
}

impl KeyDealer {
    /// Generate all key material for a Rubato parameter set: secret, public,
    /// relinearization and rotation keys, the StC matrices, and the
    /// half-bootstrapper.
    pub fn new<R: RngCore + CryptoRng>(
        par: &Arc<Parameters>,
        rubato_param: RubatoParam,
        mod_down: ModDownParams,
        radix: usize,
        rng: &mut R,
    ) -> Result<Self> {
        let sk = SecretKey::random(par, rng);
        let pk = PublicKey::new(&sk, rng)?;
        let rlk = RelinearizationKey::new(&sk, rng)?;

        let fv_encoder = FvEncoder::new(par)?;
        let ckks_encoder = CkksEncoder::new(par);
        let stc = SlotsToCoeffs::generate(par, &fv_encoder, radix, mod_down.stc_mod_down)?;

        let mut rotations = stc.rotations();
        rotations.extend(HalfBootstrapper::rotations_needed(par));
        rotations.sort_unstable();
        rotations.dedup();
        let rtks = RotationKeySet::for_rotations(&sk, &rotations, rng)?;

        let half_bootstrapper = HalfBootstrapper::new(par, rlk.clone(), rtks.clone())?;

        Ok(Self {
            par: par.clone(),
            rubato_param,
            mod_down,
            sk,
            pk,
            rlk,
            rtks,
            fv_encoder,
            ckks_encoder,
            stc,
            half_bootstrapper,
        })
    }

    /// The parameters the dealer was built for.
    pub fn parameters(&self) -> &Arc<Parameters> {
        &self.par
    }

    /// The Rubato parameter set in use.
    pub const fn rubato_param(&self) -> &RubatoParam {
        &self.rubato_param
    }

    /// The modulus-switch schedules in use.
    pub const fn mod_down(&self) -> &ModDownParams {
        &self.mod_down
    }

    /// Persist the key material to a directory. Existing key files are left
    /// untouched so a dealer restart reuses them.
    pub fn write_to_dir<P: AsRef<Path>>(&self, dir: P) -> Result<()> {
        let dir = dir.as_ref();
        let targets = [
            ("secret.key", serialization::serialize_secret_key(&self.sk)),
            ("public.key", serialization::serialize_public_key(&self.pk)),
            (
                "relinearization.keys",
                serialization::serialize_relinearization_key(&self.rlk),
            ),
            (
                "rotation.keys",
                serialization::serialize_rotation_keys(&self.rtks),
            ),
        ];
        for (name, bytes) in targets {
            let path = dir.join(name);
            if !path.exists() {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent).map_err(|e| Error::io(&path, e))?;
                }
                std::fs::write(&path, bytes).map_err(|e| Error::io(&path, e))?;
            }
        }
        Ok(())
    }

    /// Reload the key material from a directory; every file must exist.
    pub fn read_from_dir<P: AsRef<Path>>(
        par: &Arc<Parameters>,
        rubato_param: RubatoParam,
        mod_down: ModDownParams,
        radix: usize,
        dir: P,
    ) -> Result<Self> {
        let dir = dir.as_ref();
        let read = |name: &str| -> Result<Vec<u8>> {
            let path = dir.join(name);
            std::fs::read(&path).map_err(|e| Error::io(&path, e))
        };

        let sk = serialization::deserialize_secret_key(&read("secret.key")?, par)?;
        let pk = serialization::deserialize_public_key(&read("public.key")?, par)?;
        let rlk = serialization::deserialize_relinearization_key(
            &read("relinearization.keys")?,
            par,
        )?;
        let rtks = serialization::deserialize_rotation_keys(&read("rotation.keys")?, par)?;

        let fv_encoder = FvEncoder::new(par)?;
        let ckks_encoder = CkksEncoder::new(par);
        let stc = SlotsToCoeffs::generate(par, &fv_encoder, radix, mod_down.stc_mod_down)?;
        let half_bootstrapper = HalfBootstrapper::new(par, rlk.clone(), rtks.clone())?;

        Ok(Self {
            par: par.clone(),
            rubato_param,
            mod_down,
            sk,
            pk,
            rlk,
            rtks,
            fv_encoder,
            ckks_encoder,
            stc,
            half_bootstrapper,
        })
    }
}

/// The symmetric ciphertext a client produces for one batch: the encrypted
/// rows plus the (nonce, counter) material the server replays.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientBatch {
    /// One encrypted row per keystream column.
    pub symm_cipher: Vec<PlaintextRingT>,
    /// One 64-byte nonce per lane.
    pub nonces: Vec<Vec<u8>>,
    /// The 64-byte batch counter.
    pub counter: Vec<u8>,
}

/// A data owner: packs weight rows into the coefficient embedding and masks
/// them with the plaintext Rubato keystream.
pub struct Client {
    par: Arc<Parameters>,
    param: RubatoParam,
    ckks_encoder: CkksEncoder,
    key: Vec<u64>,
    output_size: usize,
}

impl Client {
    /// Creates a client for a symmetric key. The keystream width defaults
    /// to BS - 4 when `output_size` is None.
    pub fn new(
        par: &Arc<Parameters>,
        param: RubatoParam,
        key: Vec<u64>,
        output_size: Option<usize>,
    ) -> Result<Self> {
        if key.len() != param.block_size {
            return Err(Error::TooFewValues(key.len(), param.block_size));
        }
        let output_size = output_size.unwrap_or_else(|| param.output_size());
        if output_size > param.output_size() {
            return Err(Error::TooManyValues(output_size, param.output_size()));
        }
        Ok(Self {
            par: par.clone(),
            param,
            ckks_encoder: CkksEncoder::new(par),
            key,
            output_size,
        })
    }

    /// The number of keystream columns in use.
    pub const fn output_size(&self) -> usize {
        self.output_size
    }

    /// Sample fresh nonces (one per lane) and a batch counter.
    pub fn sample_nonces<R: RngCore + CryptoRng>(&self, rng: &mut R) -> (Vec<Vec<u8>>, Vec<u8>) {
        let lanes = self.par.degree();
        let mut nonces = Vec::with_capacity(lanes);
        for _ in 0..lanes {
            let mut nonce = vec![0u8; 64];
            rng.fill(&mut nonce[..]);
            nonces.push(nonce);
        }
        let mut counter = vec![0u8; 64];
        rng.fill(&mut counter[..]);
        (nonces, counter)
    }

    /// Encrypt up to `output_size` rows of at most N weights each: the rows
    /// are interleaved bit-reversed into the coefficient embedding, scaled
    /// by the message scaling, and masked with the keystream column.
    pub fn encrypt<R: RngCore + CryptoRng>(
        &self,
        rows: &[Vec<f64>],
        nonces: &[Vec<u8>],
        counter: &[u8],
        rng: &mut R,
    ) -> Result<ClientBatch> {
        let n = self.par.degree();
        if rows.len() > self.output_size {
            return Err(Error::TooManyValues(rows.len(), self.output_size));
        }
        if nonces.len() != n {
            return Err(Error::TooFewValues(nonces.len(), n));
        }

        // Offline: the plaintext keystream, one block per lane.
        let keystream: Vec<Vec<u64>> = nonces
            .iter()
            .map(|nonce| plain_rubato(&self.param, nonce, counter, &self.key, rng))
            .collect();

        let t = self.par.plaintext();
        let log_n = self.par.log_n();
        let message_scaling = self.par.message_scaling();

        let mut symm_cipher = Vec::with_capacity(self.output_size);
        for s in 0..self.output_size {
            // Interleave the row into the coefficient layout compensating
            // the bit-reversed order of CoeffsToSlots.
            let mut coefficients = vec![0.0f64; n];
            if let Some(row) = rows.get(s) {
                if row.len() > n {
                    return Err(Error::TooManyValues(row.len(), n));
                }
                let mut padded = vec![0.0f64; n];
                padded[..row.len()].copy_from_slice(row);
                for i in 0..n / 2 {
                    let j = bit_reverse(i, log_n - 1);
                    coefficients[j] = padded[i];
                    coefficients[j + n / 2] = padded[i + n / 2];
                }
            }

            // Online: scale the row up into Z_t and add the keystream
            // column to the coefficients.
            let mut rt = self
                .ckks_encoder
                .encode_coeffs_ring_t(&coefficients, message_scaling)?;
            {
                let poly = rt.poly_mut();
                let mut coeffs = poly.coefficients().to_owned();
                for (i, ks) in keystream.iter().enumerate() {
                    let j = bit_reverse(i, log_n);
                    coeffs[[0, j]] = (coeffs[[0, j]] + ks[s]) % t;
                }
                poly.set_coefficients(coeffs);
            }
            symm_cipher.push(rt);
        }

        Ok(ClientBatch {
            symm_cipher,
            nonces: nonces.to_vec(),
            counter: counter.to_vec(),
        })
    }
}

/// The aggregator: homomorphically decrypts symmetric ciphertexts into CKKS
/// ciphertexts and computes the encrypted arithmetic mean across owners.
pub struct Server {
    par: Arc<Parameters>,
    mod_down: ModDownParams,
    fv_encoder: FvEncoder,
    fv_evaluator: FvEvaluator,
    ckks_evaluator: CkksEvaluator,
    stc: SlotsToCoeffs,
    rubato: MfvRubato,
    half_bootstrapper: HalfBootstrapper,
    output_size: usize,
}

impl Server {
    /// Build the server side from the dealer's public material.
    pub fn new(dealer: &KeyDealer, output_size: Option<usize>) -> Result<Self> {
        let par = dealer.parameters().clone();
        let rubato_param = *dealer.rubato_param();
        let output_size = output_size.unwrap_or_else(|| rubato_param.output_size());

        let fv_evaluator = FvEvaluator::new(
            &par,
            Some(dealer.rlk.clone()),
            Some(dealer.rtks.clone()),
        );
        let ckks_evaluator = CkksEvaluator::new(
            &par,
            Some(dealer.rlk.clone()),
            Some(dealer.rtks.clone()),
        );
        let rubato = MfvRubato::new(
            &par,
            rubato_param,
            dealer.fv_encoder.clone(),
            fv_evaluator.clone(),
            dealer.mod_down().cipher_mod_down[0],
        )?;
        let half_bootstrapper =
            HalfBootstrapper::new(&par, dealer.rlk.clone(), dealer.rtks.clone())?;

        Ok(Self {
            par,
            mod_down: *dealer.mod_down(),
            fv_encoder: dealer.fv_encoder.clone(),
            fv_evaluator,
            ckks_evaluator,
            stc: dealer.stc.clone(),
            rubato,
            half_bootstrapper,
            output_size,
        })
    }

    /// Homomorphically evaluate the keystream for a batch and re-pack it
    /// into the coefficient domain at level 0.
    pub fn keystream_coeff_domain(
        &mut self,
        batch: &ClientBatch,
        key_ct: &[Ciphertext],
    ) -> Result<Vec<Ciphertext>> {
        self.rubato.reset(self.mod_down.cipher_mod_down[0]);
        let mut fv_keystreams =
            self.rubato
                .crypt_no_mod_switch(&batch.nonces, &batch.counter, key_ct)?;
        fv_keystreams.truncate(self.output_size);

        fv_keystreams
            .into_iter()
            .map(|ct| {
                let mut ct = self.stc.apply(&self.fv_evaluator, &ct)?;
                self.fv_evaluator.mod_switch_to_last_level(&mut ct)?;
                Ok(ct)
            })
            .collect()
    }

    /// Transcipher one client batch: subtract the homomorphic keystream
    /// from the scaled-up symmetric ciphertext in the coefficient domain,
    /// then half-bootstrap each row into a CKKS ciphertext.
    pub fn transcipher(
        &mut self,
        batch: &ClientBatch,
        key_ct: &[Ciphertext],
    ) -> Result<Vec<Ciphertext>> {
        if batch.symm_cipher.len() > self.output_size {
            return Err(Error::TooManyValues(
                batch.symm_cipher.len(),
                self.output_size,
            ));
        }
        let keystreams = self.keystream_coeff_domain(batch, key_ct)?;

        let delta_in = HalfBootstrapper::delta_in(&self.par);
        let mut out = Vec::with_capacity(batch.symm_cipher.len());
        for (s, row) in batch.symm_cipher.iter().enumerate() {
            // Scale the client payload up into a fresh degree-1 ciphertext
            // with a zero mask.
            let pt = self.fv_encoder.scale_up(row, 0)?;
            let mut ct = Ciphertext::zero(&self.par, 0)?;
            ct.c[0] = pt.poly().clone();

            // Subtract the keystream in the coefficient domain.
            let mut ks = keystreams[s].clone();
            self.fv_evaluator.transform_from_ntt(&mut ks);
            let mut ct = self.fv_evaluator.sub(&ct, &ks)?;
            self.fv_evaluator.transform_to_ntt(&mut ct);
            ct.set_scale(delta_in);

            let (boot, _) = self.half_bootstrapper.half_boot(&ct)?;
            out.push(boot);
        }
        Ok(out)
    }

    /// Aggregate per-client CKKS batches into the encrypted arithmetic
    /// mean, row by row.
    pub fn aggregate(&self, batches: &[Vec<Ciphertext>]) -> Result<Vec<Ciphertext>> {
        if batches.is_empty() {
            return Err(Error::TooFewValues(0, 1));
        }
        let rows = batches[0].len();
        for batch in batches {
            if batch.len() != rows {
                return Err(Error::TooFewValues(batch.len(), rows));
            }
        }

        let inv_k = 1.0 / batches.len() as f64;
        (0..rows)
            .map(|s| {
                let mut acc = batches[0][s].clone();
                for batch in &batches[1..] {
                    acc = self.ckks_evaluator.add(&acc, &batch[s])?;
                }
                self.ckks_evaluator.mul_const(&acc, inv_k)
            })
            .collect()
    }

    /// The CKKS evaluator bound to the dealer's keys.
    pub fn ckks_evaluator(&self) -> &CkksEvaluator {
        &self.ckks_evaluator
    }
}

/// The key holder: the only party able to decrypt aggregation results.
pub struct Holder {
    sk: SecretKey,
    ckks_encoder: CkksEncoder,
    flood_sigma: Option<f64>,
}

impl Holder {
    /// Creates a holder from the secret key. When `flood_sigma` is set, a
    /// Gaussian noise flood is added before decoding.
    pub fn new(par: &Arc<Parameters>, sk: SecretKey, flood_sigma: Option<f64>) -> Self {
        Self {
            sk,
            ckks_encoder: CkksEncoder::new(par),
            flood_sigma,
        }
    }

    /// Decrypt a CKKS ciphertext and decode the real parts of its slots.
    pub fn decrypt<R: RngCore + CryptoRng>(
        &self,
        ct: &Ciphertext,
        rng: &mut R,
    ) -> Result<Vec<f64>> {
        let pt = self.sk.try_decrypt_ckks(ct)?;
        let values = match self.flood_sigma {
            Some(sigma) => self.ckks_encoder.decode_with_flood(&pt, sigma, rng)?,
            None => self.ckks_encoder.decode(&pt)?,
        };
        Ok(values.into_iter().map(|v| v.re).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::{Client, KeyDealer};
    use crate::rubato::{plain_rubato, ModDownParams, RubatoParam};
    use crate::Parameters;
    use rand::rng;
    use rtf_util::bit_reverse;

    fn test_mod_down() -> ModDownParams {
        ModDownParams {
            cipher_mod_down: &[0, 0, 0],
            stc_mod_down: &[0],
        }
    }

    #[test]
    fn client_masks_with_keystream() {
        let mut rng = rng();
        let par = Parameters::rubato_test().unwrap();
        let param = RubatoParam::custom(16, 2, par.plaintext(), 0.0);
        let key: Vec<u64> = (1..=16).collect();
        let client = Client::new(&par, param, key.clone(), Some(1)).unwrap();

        let (nonces, counter) = client.sample_nonces(&mut rng);
        let rows = vec![vec![0.0f64; par.degree()]];
        let batch = client.encrypt(&rows, &nonces, &counter, &mut rng).unwrap();
        assert_eq!(batch.symm_cipher.len(), 1);

        // A zero row leaves exactly the keystream in the coefficients.
        let coeffs = batch.symm_cipher[0].poly().coefficients().to_owned();
        for (lane, nonce) in nonces.iter().enumerate() {
            let ks = plain_rubato(&param, nonce, &counter, &key, &mut rng);
            let j = bit_reverse(lane, par.log_n());
            assert_eq!(coeffs[[0, j]], ks[0]);
        }
    }

    #[test]
    fn dealer_generates_consistent_material() {
        let mut rng = rng();
        let par = Parameters::rubato_test().unwrap();
        let param = RubatoParam::custom(16, 2, par.plaintext(), 0.0);

        let dealer = KeyDealer::new(&par, param, test_mod_down(), 0, &mut rng).unwrap();
        // The rotation set covers the StC and CtS requirements plus the
        // conjugation.
        for step in dealer.stc.rotations() {
            assert!(dealer.rtks.key_for_step(step).is_ok());
        }
        assert!(dealer.rtks.key_for_conjugate().is_ok());
    }

    #[test]
    fn dealer_persistence_roundtrip() {
        let mut rng = rng();
        let par = Parameters::rubato_test().unwrap();
        let param = RubatoParam::custom(16, 2, par.plaintext(), 0.0);
        let dealer = KeyDealer::new(&par, param, test_mod_down(), 0, &mut rng).unwrap();

        let dir = std::env::temp_dir().join(format!("rtf-dealer-{}", rand::random::<u64>()));
        dealer.write_to_dir(&dir).unwrap();
        let reloaded =
            KeyDealer::read_from_dir(&par, param, test_mod_down(), 0, &dir).unwrap();
        assert_eq!(dealer.sk, reloaded.sk);
        assert_eq!(dealer.pk.c0, reloaded.pk.c0);

        std::fs::remove_dir_all(&dir).ok();

        // Missing keys on disk are fatal, with the path surfaced.
        let missing = KeyDealer::read_from_dir(&par, param, test_mod_down(), 0, &dir);
        assert!(missing.unwrap_err().to_string().contains("secret.key"));
    }
}
