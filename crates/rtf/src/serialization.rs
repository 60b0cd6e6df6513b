//! Byte-level persistence of ciphertexts, plaintexts and key material.
//!
//! Every artifact uses the same self-delimiting binary layout: a u64
//! polynomial count, then for each polynomial a u64 byte length followed by
//! its residue words (level-major, little-endian), then the f64 scale and a
//! u8 NTT flag. Ciphertext arrays are directories with a `length.txt` file
//! and one `ct_{i}.bin` per element.

use crate::bfv::{Ciphertext, PlaintextRingT};
use crate::keys::{
    GaloisKey, KeySwitchingKey, PublicKey, RelinearizationKey, RotationKeySet, SecretKey,
};
use crate::{Error, Parameters, Result};
use rtf_math::rq::{Context, Poly, Representation};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

struct Reader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.offset + len > self.bytes.len() {
            return Err(Error::SerializationError(format!(
                "Short read: needed {len} bytes at offset {}",
                self.offset
            )));
        }
        let out = &self.bytes[self.offset..self.offset + len];
        self.offset += len;
        Ok(out)
    }

    fn u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn f64(&mut self) -> Result<f64> {
        Ok(f64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn finish(&self) -> Result<()> {
        if self.offset != self.bytes.len() {
            return Err(Error::SerializationError(format!(
                "{} trailing bytes",
                self.bytes.len() - self.offset
            )));
        }
        Ok(())
    }
}

fn push_poly(out: &mut Vec<u8>, p: &Poly) {
    let bytes = p.to_bytes();
    out.extend_from_slice(&(bytes.len() as u64).to_le_bytes());
    out.extend_from_slice(&bytes);
}

/// Infer the context of a serialized polynomial from its byte length: the
/// number of residues determines the level of the Q chain.
fn ctx_for_len(par: &Arc<Parameters>, byte_len: usize) -> Result<Arc<Context>> {
    let per_row = par.degree() * 8;
    if byte_len == 0 || byte_len % per_row != 0 {
        return Err(Error::SerializationError(format!(
            "Invalid polynomial length {byte_len}"
        )));
    }
    let rows = byte_len / per_row;
    if rows > par.moduli().len() {
        return Err(Error::SerializationError(format!(
            "Too many residues: {rows}"
        )));
    }
    Ok(par.ctx_q_level(rows - 1)?.clone())
}

/// Serialize a ciphertext into the common layout.
pub fn serialize_ciphertext(ct: &Ciphertext) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&(ct.len() as u64).to_le_bytes());
    for p in ct.iter() {
        push_poly(&mut out, p);
    }
    out.extend_from_slice(&ct.scale().to_le_bytes());
    out.push(ct.is_ntt() as u8);
    out
}

/// Deserialize a ciphertext; the level is recovered from the residue count.
pub fn deserialize_ciphertext(bytes: &[u8], par: &Arc<Parameters>) -> Result<Ciphertext> {
    let mut r = Reader::new(bytes);
    let count = r.u64()? as usize;
    if count < 2 {
        return Err(Error::SerializationError(format!(
            "A ciphertext needs at least 2 polynomials, found {count}"
        )));
    }

    let mut raw = Vec::with_capacity(count);
    for _ in 0..count {
        let len = r.u64()? as usize;
        raw.push(r.take(len)?);
    }
    let scale = r.f64()?;
    let is_ntt = r.u8()? != 0;
    r.finish()?;

    let repr = if is_ntt {
        Representation::Ntt
    } else {
        Representation::PowerBasis
    };
    let c = raw
        .iter()
        .map(|b| {
            let ctx = ctx_for_len(par, b.len())?;
            Poly::from_bytes(b, &ctx, repr).map_err(Error::MathError)
        })
        .collect::<Result<Vec<_>>>()?;

    Ciphertext::new(c, scale, par)
}

/// Serialize a plaintext over Z_t into the common layout.
pub fn serialize_plaintext_ring_t(pt: &PlaintextRingT) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&1u64.to_le_bytes());
    push_poly(&mut out, pt.poly());
    out.extend_from_slice(&pt.scale().to_le_bytes());
    out.push(0u8);
    out
}

/// Deserialize a plaintext over Z_t.
pub fn deserialize_plaintext_ring_t(
    bytes: &[u8],
    par: &Arc<Parameters>,
) -> Result<PlaintextRingT> {
    let mut r = Reader::new(bytes);
    let count = r.u64()? as usize;
    if count != 1 {
        return Err(Error::SerializationError(format!(
            "A plaintext holds one polynomial, found {count}"
        )));
    }
    let len = r.u64()? as usize;
    let raw = r.take(len)?;
    let scale = r.f64()?;
    let _ = r.u8()?;
    r.finish()?;

    let poly = Poly::from_bytes(raw, &par.ctx_t, Representation::PowerBasis)
        .map_err(Error::MathError)?;
    let mut pt = PlaintextRingT::zero(par);
    *pt.poly_mut() = poly;
    pt.scale = scale;
    Ok(pt)
}

fn write_file<P: AsRef<Path>>(path: P, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.as_ref().parent() {
        std::fs::create_dir_all(parent).map_err(|e| Error::io(&path, e))?;
    }
    std::fs::write(&path, bytes).map_err(|e| Error::io(&path, e))
}

fn read_file<P: AsRef<Path>>(path: P) -> Result<Vec<u8>> {
    std::fs::read(&path).map_err(|e| Error::io(&path, e))
}

/// Write a ciphertext to a file.
pub fn write_ciphertext<P: AsRef<Path>>(path: P, ct: &Ciphertext) -> Result<()> {
    write_file(path, &serialize_ciphertext(ct))
}

/// Read a ciphertext from a file.
pub fn read_ciphertext<P: AsRef<Path>>(path: P, par: &Arc<Parameters>) -> Result<Ciphertext> {
    deserialize_ciphertext(&read_file(&path)?, par)
        .map_err(|e| Error::io(&path, e))
}

/// Write an array of ciphertexts to a directory: `length.txt` holds the
/// decimal count, element i lives in `ct_{i}.bin`.
pub fn write_ciphertext_array<P: AsRef<Path>>(dir: P, cts: &[Ciphertext]) -> Result<()> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;
    write_file(dir.join("length.txt"), cts.len().to_string().as_bytes())?;
    for (i, ct) in cts.iter().enumerate() {
        write_ciphertext(dir.join(format!("ct_{i}.bin")), ct)?;
    }
    Ok(())
}

/// Read an array of ciphertexts from a directory.
pub fn read_ciphertext_array<P: AsRef<Path>>(
    dir: P,
    par: &Arc<Parameters>,
) -> Result<Vec<Ciphertext>> {
    let dir = dir.as_ref();
    let length_path = dir.join("length.txt");
    let length: usize = String::from_utf8_lossy(&read_file(&length_path)?)
        .trim()
        .parse()
        .map_err(|e| Error::io(&length_path, e))?;

    (0..length)
        .map(|i| read_ciphertext(dir.join(format!("ct_{i}.bin")), par))
        .collect()
}

/// Write a symmetric key as consecutive little-endian words.
pub fn write_sym_key<P: AsRef<Path>>(path: P, key: &[u64]) -> Result<()> {
    write_file(path, &rtf_util::words_to_bytes(key))
}

/// Read a symmetric key of `block_size` words.
pub fn read_sym_key<P: AsRef<Path>>(path: P, block_size: usize) -> Result<Vec<u64>> {
    let bytes = read_file(&path)?;
    let words = rtf_util::bytes_to_words(&bytes).ok_or_else(|| {
        Error::io(&path, "the key file is not a sequence of 8-byte words")
    })?;
    if words.len() != block_size {
        return Err(Error::io(
            &path,
            format!("expected {block_size} words, found {}", words.len()),
        ));
    }
    Ok(words)
}

/// Serialize a secret key: its ternary coefficients as signed words.
pub fn serialize_secret_key(sk: &SecretKey) -> Vec<u8> {
    rtf_util::words_to_bytes(
        &sk.coeffs
            .iter()
            .map(|c| *c as u64)
            .collect::<Vec<_>>(),
    )
}

/// Deserialize a secret key.
pub fn deserialize_secret_key(bytes: &[u8], par: &Arc<Parameters>) -> Result<SecretKey> {
    let words = rtf_util::bytes_to_words(bytes)
        .ok_or_else(|| Error::SerializationError("Invalid word alignment".to_string()))?;
    if words.len() != par.degree() {
        return Err(Error::SerializationError(format!(
            "Expected {} coefficients, found {}",
            par.degree(),
            words.len()
        )));
    }
    let coeffs: Vec<i64> = words.iter().map(|w| *w as i64).collect();
    if coeffs.iter().filter(|c| **c != 0).count() != par.hamming_weight()
        || coeffs.iter().any(|c| c.abs() > 1)
    {
        return Err(Error::SerializationError(
            "The secret key coefficients are not sparse ternary".to_string(),
        ));
    }
    Ok(SecretKey::new(coeffs, par))
}

fn push_qp_poly(out: &mut Vec<u8>, p: &Poly) {
    push_poly(out, p)
}

fn read_qp_poly(r: &mut Reader<'_>, par: &Arc<Parameters>) -> Result<Poly> {
    let len = r.u64()? as usize;
    let raw = r.take(len)?;
    let ctx = par.ctx_qp_level(par.max_level())?;
    Poly::from_bytes(raw, ctx, Representation::Ntt).map_err(Error::MathError)
}

/// Serialize a public key: its two polynomials over the full Q chain.
pub fn serialize_public_key(pk: &PublicKey) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&2u64.to_le_bytes());
    push_poly(&mut out, &pk.c0);
    push_poly(&mut out, &pk.c1);
    out.extend_from_slice(&1.0f64.to_le_bytes());
    out.push(1u8);
    out
}

/// Deserialize a public key.
pub fn deserialize_public_key(bytes: &[u8], par: &Arc<Parameters>) -> Result<PublicKey> {
    let mut r = Reader::new(bytes);
    let count = r.u64()? as usize;
    if count != 2 {
        return Err(Error::SerializationError(format!(
            "A public key holds 2 polynomials, found {count}"
        )));
    }
    let mut polys = Vec::with_capacity(2);
    for _ in 0..2 {
        let len = r.u64()? as usize;
        let raw = r.take(len)?;
        polys.push(
            Poly::from_bytes(raw, &par.ctx_q, Representation::Ntt).map_err(Error::MathError)?,
        );
    }
    let _ = r.f64()?;
    let _ = r.u8()?;
    r.finish()?;

    let c1 = polys.pop().unwrap();
    let c0 = polys.pop().unwrap();
    Ok(PublicKey {
        par: par.clone(),
        seed: None,
        c0,
        c1,
    })
}

fn serialize_ksk(ksk: &KeySwitchingKey) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&(ksk.c0.len() as u64).to_le_bytes());
    for (c0, c1) in ksk.c0.iter().zip(ksk.c1.iter()) {
        push_qp_poly(&mut out, c0);
        push_qp_poly(&mut out, c1);
    }
    out
}

fn deserialize_ksk(r: &mut Reader<'_>, par: &Arc<Parameters>) -> Result<KeySwitchingKey> {
    let count = r.u64()? as usize;
    if count != par.moduli().len() {
        return Err(Error::SerializationError(format!(
            "Expected {} switching digits, found {count}",
            par.moduli().len()
        )));
    }
    let mut c0 = Vec::with_capacity(count);
    let mut c1 = Vec::with_capacity(count);
    for _ in 0..count {
        c0.push(read_qp_poly(r, par)?);
        c1.push(read_qp_poly(r, par)?);
    }
    Ok(KeySwitchingKey {
        par: par.clone(),
        seed: None,
        c0: c0.into_boxed_slice(),
        c1: c1.into_boxed_slice(),
    })
}

/// Serialize a relinearization key.
pub fn serialize_relinearization_key(rlk: &RelinearizationKey) -> Vec<u8> {
    serialize_ksk(&rlk.ksk)
}

/// Deserialize a relinearization key.
pub fn deserialize_relinearization_key(
    bytes: &[u8],
    par: &Arc<Parameters>,
) -> Result<RelinearizationKey> {
    let mut r = Reader::new(bytes);
    let ksk = deserialize_ksk(&mut r, par)?;
    r.finish()?;
    Ok(RelinearizationKey { ksk })
}

/// Serialize a rotation key set: the Galois element of each key followed by
/// its switching key.
pub fn serialize_rotation_keys(rtks: &RotationKeySet) -> Vec<u8> {
    let mut out = Vec::new();
    let mut elements: Vec<u64> = rtks.keys.keys().copied().collect();
    elements.sort_unstable();
    out.extend_from_slice(&(elements.len() as u64).to_le_bytes());
    for element in elements {
        out.extend_from_slice(&element.to_le_bytes());
        out.extend_from_slice(&serialize_ksk(&rtks.keys[&element].ksk));
    }
    out
}

/// Deserialize a rotation key set.
pub fn deserialize_rotation_keys(
    bytes: &[u8],
    par: &Arc<Parameters>,
) -> Result<RotationKeySet> {
    let mut r = Reader::new(bytes);
    let count = r.u64()? as usize;
    let mut keys = HashMap::with_capacity(count);
    for _ in 0..count {
        let element = r.u64()?;
        let ksk = deserialize_ksk(&mut r, par)?;
        keys.insert(element, GaloisKey { element, ksk });
    }
    r.finish()?;
    Ok(RotationKeySet {
        par: par.clone(),
        keys,
    })
}
